use diagrammer_core::config::{load_config, ProviderKind, SUPPORTED_CONFIG_VERSION};
use diagrammer_core::model::DiagramKind;
use std::io::Write;
use tempfile::NamedTempFile;

#[test]
fn test_config_version_defaults() -> anyhow::Result<()> {
    let mut tmp = NamedTempFile::new()?;
    writeln!(
        tmp,
        r#"
llm:
  provider: nvidia
"#
    )?;

    let cfg = load_config(tmp.path(), false)?;
    assert_eq!(cfg.version, SUPPORTED_CONFIG_VERSION);
    assert_eq!(cfg.llm.provider, ProviderKind::Nvidia);
    assert_eq!(cfg.llm.model_name(), "meta/llama-3.1-70b-instruct");
    assert_eq!(cfg.render.timeout_ms, 5_000);
    assert_eq!(cfg.llm.request_timeout_ms, 30_000);
    assert_eq!(cfg.limits.max_prompt_chars, 2_000);
    assert!(cfg.cache.enabled);
    Ok(())
}

#[test]
fn test_config_version_explicit_v1() -> anyhow::Result<()> {
    let mut tmp = NamedTempFile::new()?;
    writeln!(
        tmp,
        r#"
configVersion: 1
render:
  timeout_ms: 2500
  max_timeline_chars: 1000
cache:
  enabled: false
  retention_days: 7
"#
    )?;

    let cfg = load_config(tmp.path(), true)?;
    assert_eq!(cfg.version, 1);
    assert_eq!(cfg.render.timeout_ms, 2_500);
    assert_eq!(cfg.render.max_markup_chars(DiagramKind::Timeline), 1_000);
    assert_eq!(cfg.render.max_markup_chars(DiagramKind::Graph), 50_000);
    assert!(!cfg.cache.enabled);
    assert_eq!(cfg.cache.retention_days, 7);
    Ok(())
}

#[test]
fn test_config_version_unsupported() -> anyhow::Result<()> {
    let mut tmp = NamedTempFile::new()?;
    writeln!(tmp, "configVersion: 2")?;

    let err = load_config(tmp.path(), false).unwrap_err();
    assert!(err.to_string().contains("unsupported config version 2"), "{err}");
    Ok(())
}

#[test]
fn test_missing_file_is_reported() {
    let err = load_config(std::path::Path::new("/definitely/not/here.yaml"), false).unwrap_err();
    assert!(err.to_string().contains("failed to read config"));
}
