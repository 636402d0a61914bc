pub const DDL: &str = r#"
CREATE TABLE IF NOT EXISTS diagrams (
  fingerprint TEXT PRIMARY KEY,
  kind TEXT NOT NULL,
  markup_json TEXT NOT NULL,
  rendered BLOB NOT NULL,
  mime_type TEXT NOT NULL,
  engine_used TEXT NOT NULL,
  render_latency_ms INTEGER NOT NULL,
  created_at TEXT NOT NULL,
  hit_count INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS generation_logs (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  fingerprint TEXT NOT NULL,
  kind TEXT NOT NULL,
  outcome TEXT NOT NULL,
  stage TEXT,
  error_kind TEXT,
  coalesced INTEGER NOT NULL DEFAULT 0,
  provider TEXT NOT NULL,
  model TEXT NOT NULL,
  token_usage INTEGER,
  cache_ms INTEGER NOT NULL,
  generation_ms INTEGER NOT NULL,
  render_ms INTEGER NOT NULL,
  total_ms INTEGER NOT NULL,
  created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_diagrams_created_at ON diagrams(created_at);
CREATE INDEX IF NOT EXISTS idx_generation_logs_created_at ON generation_logs(created_at);
CREATE INDEX IF NOT EXISTS idx_generation_logs_fingerprint ON generation_logs(fingerprint);
"#;
