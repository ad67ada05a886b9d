#![no_main]
use libfuzzer_sys::fuzz_target;
use std::time::Duration;
use toolcall_harness::sse::SseParser;
use toolcall_harness::stream::{Flow, StreamAggregator};

// First byte picks a split point so chunk boundaries vary with the input.
fuzz_target!(|data: &[u8]| {
    let Some((&split, rest)) = data.split_first() else {
        return;
    };
    let text = String::from_utf8_lossy(rest);
    let cut = text
        .char_indices()
        .map(|(i, _)| i)
        .nth(usize::from(split))
        .unwrap_or(text.len());
    let (head, tail) = text.split_at(cut);

    let mut parser = SseParser::new();
    let mut aggregator = StreamAggregator::new();
    let mut events = parser.feed(head);
    events.extend(parser.feed(tail));
    events.extend(parser.flush());
    for event in events {
        match aggregator.push_data(&event.data) {
            Ok(Flow::Continue) => {}
            Ok(Flow::Done) | Err(_) => break,
        }
    }
    let _ = aggregator.finish(Duration::ZERO);
});
