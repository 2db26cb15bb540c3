//! Table layout.

/// Schema applied when a pool is opened. Idempotent.
pub const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS resources (
        uid TEXT PRIMARY KEY,
        cluster TEXT NOT NULL,
        data TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS resources_cluster_idx ON resources (cluster);
    CREATE INDEX IF NOT EXISTS data_kind_idx ON resources (json_extract(data, '$.kind'));

    CREATE TABLE IF NOT EXISTS edges (
        sourceid TEXT NOT NULL,
        sourcekind TEXT NOT NULL,
        destid TEXT NOT NULL,
        destkind TEXT NOT NULL,
        edgetype TEXT NOT NULL,
        cluster TEXT NOT NULL,
        PRIMARY KEY (sourceid, destid, edgetype)
    );

    CREATE INDEX IF NOT EXISTS edges_cluster_idx ON edges (cluster);
    CREATE INDEX IF NOT EXISTS edges_destid_idx ON edges (destid);
";
