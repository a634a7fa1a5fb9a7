//! Merging generated documents through the public synthesizer API

use lopdf::content::Content;
use lopdf::Document;
use std::sync::Arc;
use treepdf_pdf::{
    page_count, FontCatalog, PdfSynthesizer, SourceDocument, SynthesizerOptions,
};

fn synthesizer() -> PdfSynthesizer {
    PdfSynthesizer::new(Arc::new(FontCatalog::default()), &SynthesizerOptions::default())
        .expect("builtin fonts")
}

fn long_text(lines: usize) -> String {
    (0..lines).map(|i| format!("line {i}")).collect::<Vec<_>>().join("\n")
}

fn page_texts(bytes: &[u8]) -> Vec<String> {
    let doc = Document::load_mem(bytes).unwrap();
    doc.get_pages()
        .values()
        .map(|id| String::from_utf8_lossy(&doc.get_page_content(*id).unwrap()).into_owned())
        .collect()
}

#[test]
fn test_page_count_is_sum_in_order() {
    let synth = synthesizer();
    let two = synth.text_document(&long_text(100)).unwrap();
    let one = synth.text_document("single").unwrap();
    let sample = synth.render_sample("Sample", "helveticaB", 20.0).unwrap();
    assert_eq!(page_count(&two).unwrap(), 2);

    let merged = synth
        .merge(
            &[
                SourceDocument::new("docs/notes.txt", two),
                SourceDocument::new("docs/readme.md", one),
                SourceDocument::new("fonts/sample.pdf", sample),
            ],
            true,
        )
        .unwrap();

    assert_eq!(page_count(&merged).unwrap(), 4);
    let texts = page_texts(&merged);
    assert!(texts[0].contains("notes 1/2"));
    assert!(texts[1].contains("notes 2/2"));
    assert!(texts[2].contains("readme 1/1"));
    assert!(texts[3].contains("sample 1/1"));
}

#[test]
fn test_merge_without_labels() {
    let synth = synthesizer();
    let doc = synth.text_document("plain").unwrap();
    let merged = synth
        .merge(&[SourceDocument::new("a.txt", doc.clone()), SourceDocument::new("b.txt", doc)], false)
        .unwrap();
    assert_eq!(page_count(&merged).unwrap(), 2);
    assert!(page_texts(&merged).iter().all(|t| !t.contains("1/1")));
}

#[test]
fn test_broken_input_becomes_error_page() {
    let synth = synthesizer();
    let good = synth.text_document("fine").unwrap();
    let merged = synth
        .merge(
            &[
                SourceDocument::new("bad.pdf", b"%PDF-1.4 garbage".to_vec()),
                SourceDocument::new("good.txt", good),
            ],
            true,
        )
        .unwrap();
    assert_eq!(page_count(&merged).unwrap(), 2);
    let texts = page_texts(&merged);
    assert!(texts[0].contains("Error, caught an exception."));
    assert!(texts[0].contains("bad 1/1"));
}

#[test]
fn test_merge_is_reloadable() {
    let synth = synthesizer();
    let first = synth
        .merge(&[SourceDocument::new("x.txt", synth.text_document("x").unwrap())], true)
        .unwrap();
    // A merged document can itself be merged again
    let second = synth
        .merge(&[SourceDocument::new("merged.pdf", first.clone()), SourceDocument::new("again.pdf", first)], true)
        .unwrap();
    assert_eq!(page_count(&second).unwrap(), 2);
}

#[test]
fn test_empty_merge_has_no_pages() {
    let merged = synthesizer().merge(&[], true).unwrap();
    let doc = Document::load_mem(&merged).unwrap();
    assert!(doc.get_pages().is_empty());
}

#[test]
fn test_label_on_rotated_page_reads_upright() {
    let synth = synthesizer();
    let mut doc = Document::load_mem(&synth.text_document("turned").unwrap()).unwrap();
    let page_id = *doc.get_pages().values().next().unwrap();
    doc.get_dictionary_mut(page_id).unwrap().set("Rotate", 90);
    let mut rotated = Vec::new();
    doc.save_to(&mut rotated).unwrap();

    let merged = synth
        .merge(&[SourceDocument::new("scans/turned.pdf", rotated)], true)
        .unwrap();
    let out = Document::load_mem(&merged).unwrap();
    let id = *out.get_pages().values().next().unwrap();
    let content = Content::decode(&out.get_page_content(id).unwrap()).unwrap();
    let label = content
        .operations
        .iter()
        .rev()
        .find(|op| op.operator == "Tm")
        .expect("label text matrix");
    let matrix: Vec<f32> = label.operands.iter().map(|o| o.as_float().unwrap()).collect();
    // Baseline along the page's y axis, which is left to right once turned
    assert_eq!(matrix[..4], [0.0, 1.0, -1.0, 0.0]);
}
