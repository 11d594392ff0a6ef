pub const SCHEMA: &str = r#"
-- Users; access keys and linked providers are JSON arrays
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    email TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    access_keys TEXT NOT NULL DEFAULT '[]',
    linked_providers TEXT NOT NULL DEFAULT '[]',
    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT DEFAULT (datetime('now'))
);

-- Apps; collaborators is a JSON object keyed by email
CREATE TABLE IF NOT EXISTS apps (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    collaborators TEXT NOT NULL DEFAULT '{}',
    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT DEFAULT (datetime('now'))
);

-- Deployments; history is a JSON array of package ids, newest first
CREATE TABLE IF NOT EXISTS deployments (
    id TEXT PRIMARY KEY,
    app_id TEXT NOT NULL REFERENCES apps(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    key TEXT NOT NULL UNIQUE,
    history TEXT NOT NULL DEFAULT '[]',
    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT DEFAULT (datetime('now')),

    UNIQUE(app_id, name)
);

-- Packages are shared by history entries and never cascade-deleted
CREATE TABLE IF NOT EXISTS packages (
    id TEXT PRIMARY KEY,
    label TEXT NOT NULL,
    app_version TEXT NOT NULL,
    description TEXT,
    package_hash TEXT NOT NULL,
    is_mandatory INTEGER NOT NULL DEFAULT 0,
    rollout INTEGER,
    size INTEGER,
    release_method TEXT,
    original_label TEXT,
    original_deployment TEXT,
    released_by TEXT,
    created TEXT NOT NULL
);

-- Bundle content, addressed by hash
CREATE TABLE IF NOT EXISTS packages_content (
    package_hash TEXT PRIMARY KEY,
    content BLOB NOT NULL,
    version INTEGER NOT NULL DEFAULT 1,
    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT DEFAULT (datetime('now'))
);

-- Append-only client reports
CREATE TABLE IF NOT EXISTS metrics (
    deployment_key TEXT NOT NULL,
    client_unique_id TEXT NOT NULL,
    label TEXT,
    status TEXT NOT NULL,
    app_version TEXT,
    previous_label_or_app_version TEXT,
    previous_deployment_key TEXT,
    created_at TEXT DEFAULT (datetime('now'))
);

-- Staged rollout decisions, one per client and package
CREATE TABLE IF NOT EXISTS client_ratios (
    client_unique_id TEXT NOT NULL,
    package_hash TEXT NOT NULL,
    ratio REAL NOT NULL,
    updated INTEGER NOT NULL DEFAULT 0,
    updated_at TEXT DEFAULT (datetime('now')),
    PRIMARY KEY (client_unique_id, package_hash)
);

-- Create indexes
CREATE INDEX IF NOT EXISTS idx_deployments_app ON deployments(app_id);
CREATE INDEX IF NOT EXISTS idx_packages_label ON packages(label);
CREATE INDEX IF NOT EXISTS idx_metrics_deployment_key ON metrics(deployment_key);
"#;
