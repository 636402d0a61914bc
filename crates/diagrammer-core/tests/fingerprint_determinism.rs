use diagrammer_core::fingerprint::{compute, Fingerprint};
use diagrammer_core::model::{
    DiagramKind, GenerationRequest, LayoutEngine, ModelIdentity, OutputFormat,
};

fn req(kind: DiagramKind, prompt: &str) -> GenerationRequest {
    GenerationRequest::new(kind, prompt, ModelIdentity::new("openai", "gpt-4o-mini"))
}

#[test]
fn test_whitespace_variants_hash_equal() {
    let base = compute(&req(DiagramKind::Graph, "Draw a flowchart with start, process, end"));
    for variant in [
        "  Draw a flowchart with start, process, end  ",
        "Draw  a\tflowchart\nwith start,   process, end",
        "\n\nDraw a flowchart with start, process, end\n",
    ] {
        assert_eq!(compute(&req(DiagramKind::Graph, variant)), base, "{variant:?}");
    }
}

#[test]
fn test_every_output_affecting_field_changes_the_key() {
    let base = req(DiagramKind::Graph, "services talking to a database");
    let fp = compute(&base);

    let changed = [
        req(DiagramKind::Graph, "services talking to a cache"),
        req(DiagramKind::Breakdown, "services talking to a database"),
        base.clone().with_format(OutputFormat::Png),
        base.clone().with_layout(LayoutEngine::Circo),
        GenerationRequest::new(
            DiagramKind::Graph,
            "services talking to a database",
            ModelIdentity::new("openai", "gpt-4o"),
        ),
        GenerationRequest::new(
            DiagramKind::Graph,
            "services talking to a database",
            ModelIdentity::new("gemini", "gpt-4o-mini"),
        ),
    ];
    for other in changed {
        assert_ne!(compute(&other), fp, "{other:?}");
    }
}

#[test]
fn test_layout_is_ignored_outside_graphs() {
    let a = req(DiagramKind::Timeline, "release plan");
    let b = a.clone().with_layout(LayoutEngine::Neato);
    assert_eq!(compute(&a), compute(&b));
}

#[test]
fn test_prompt_case_is_significant_but_model_case_is_not() {
    let lower = req(DiagramKind::Graph, "login flow");
    let upper = req(DiagramKind::Graph, "LOGIN FLOW");
    assert_ne!(compute(&lower), compute(&upper));

    let shouty_model = GenerationRequest::new(
        DiagramKind::Graph,
        "login flow",
        ModelIdentity::new(" OpenAI ", "GPT-4o-Mini"),
    );
    assert_eq!(compute(&lower), compute(&shouty_model));
}

#[test]
fn test_digest_is_stable_hex() {
    let fp = compute(&req(DiagramKind::Timeline, "q3 roadmap"));
    assert_eq!(fp.as_str().len(), 64);
    assert_eq!(Fingerprint::from_hex(fp.as_str()), Some(fp.clone()));
    assert_eq!(fp.short().len(), 12);
    assert!(Fingerprint::from_hex("XYZ").is_none());
}
