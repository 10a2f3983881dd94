#![no_main]

use libfuzzer_sys::fuzz_target;
use std::fs;

fuzz_target!(|data: (&[u8], usize)| {
    let tokens: Vec<i64> = data
        .0
        .chunks_exact(4)
        .map(|c| bytemuck::pod_read_unaligned::<i32>(c) as i64)
        .collect();
    let tapes = cascadesort::MIN_TAPES + data.1 % 8;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("input.txt");
    let text: Vec<String> = tokens.iter().map(|t| t.to_string()).collect();
    fs::write(&path, text.join("\n")).unwrap();

    let stats = cascadesort::sort(&path, tapes).unwrap();
    assert_eq!(stats.tokens, tokens.len() as u64);

    let sorted: Vec<i64> = fs::read_to_string(&path)
        .unwrap()
        .split_whitespace()
        .map(|t| t.parse().unwrap())
        .collect();
    let mut expected = tokens;
    expected.sort_by(|a, b| b.cmp(a));
    assert_eq!(sorted, expected);
});
