#![no_main]

use libfuzzer_sys::fuzz_target;
use waypoint::chunkqueue::ChunkQueue;
use waypoint::parser::h1::request::RequestParser;

fuzz_target!(|data: &[u8]| {
    let mut parser = RequestParser::new();
    let mut raw_in = ChunkQueue::unlimited();
    raw_in.append(data.to_vec());
    if let waypoint::parser::h1::request::ParseOutcome::GoOn = parser.advance(&mut raw_in) {
        let _ = parser.parsed_head();
    }
});
