#![no_main]
use blinds_core::{Command, TopicRole, decode};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|input: (u8, &str)| {
    let (role, payload) = input;
    let role = match role % 3 {
        0 => TopicRole::Command,
        1 => TopicRole::SetPosition,
        _ => TopicRole::Feedback,
    };
    match decode(role, payload) {
        Some(Command::SetPosition(p) | Command::Feedback(p)) => assert!(p <= 100),
        Some(_) | None => {}
    }
});
