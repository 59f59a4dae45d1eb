use pretty_assertions::assert_eq;
use watcher_core::{aggregate, CodeHit};

#[test]
fn first_source_keeps_attribution() {
    let hits = vec![
        CodeHit::new("ZZZZZ-11111", "https://a.example"),
        CodeHit::new("AAAAA-22222", "https://a.example"),
        CodeHit::new("ZZZZZ-11111", "https://b.example"),
        CodeHit::new("MMMMM-33333", "https://b.example"),
    ];

    let merged = aggregate(hits);
    assert_eq!(
        merged,
        vec![
            CodeHit::new("AAAAA-22222", "https://a.example"),
            CodeHit::new("MMMMM-33333", "https://b.example"),
            CodeHit::new("ZZZZZ-11111", "https://a.example"),
        ]
    );
}

#[test]
fn empty_input_gives_empty_output() {
    assert!(aggregate(Vec::new()).is_empty());
}
