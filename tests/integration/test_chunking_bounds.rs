//! Chunk size and overlap bounds over realistic inputs.

use ragvault::content::TextSplitter;

fn report_text() -> String {
    let paragraph = |topic: &str, n: usize| {
        (0..n)
            .map(|i| format!("The {topic} figure for period {i} was revised after review."))
            .collect::<Vec<_>>()
            .join(" ")
    };
    format!(
        "Quarterly Report\n\n{}\n\n{}\nAppendix line one\nAppendix line two\n\n{}",
        paragraph("revenue", 9),
        paragraph("cost", 4),
        "x".repeat(700)
    )
}

#[test]
fn test_every_chunk_within_bounds() {
    let text = report_text();
    for (size, overlap) in [(512, 200), (120, 30), (64, 0), (17, 16)] {
        let splitter = TextSplitter::new(size, overlap);
        let chunks = splitter.split(&text);
        assert!(!chunks.is_empty());
        for chunk in &chunks {
            let len = chunk.chars().count();
            assert!(len <= size, "chunk of {len} chars exceeds {size}");
            assert!(!chunk.trim().is_empty());
            assert_eq!(chunk.trim(), chunk);
        }
        println!("size {size} overlap {overlap}: {} chunks", chunks.len());
    }
}

#[test]
fn test_all_words_survive_splitting() {
    let text = report_text();
    let chunks = TextSplitter::new(120, 30).split(&text);
    let joined = chunks.join(" ");
    for word in text.split_whitespace().filter(|w| !w.starts_with('x')) {
        assert!(joined.contains(word), "lost '{word}'");
    }
}

#[test]
fn test_default_settings_splitter() {
    let splitter = ragvault::Settings::default().splitter();
    assert_eq!(splitter.chunk_size(), 512);
    assert_eq!(splitter.chunk_overlap(), 200);
    // Short input stays whole
    assert_eq!(splitter.split("one short note"), vec!["one short note"]);
}
