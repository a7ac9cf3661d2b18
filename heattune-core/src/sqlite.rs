use rusqlite::Connection;

/// Applies the pragmas every heattune database connection runs with.
/// Read-only handles skip the journal switch since they cannot write it.
pub fn configure_connection(conn: &Connection, read_only: bool) -> rusqlite::Result<()> {
    if read_only {
        return conn.execute_batch(
            "PRAGMA query_only = ON;\n\
             PRAGMA busy_timeout = 5000;\n",
        );
    }
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;\n\
         PRAGMA synchronous = NORMAL;\n\
         PRAGMA temp_store = MEMORY;\n\
         PRAGMA busy_timeout = 5000;\n",
    )
}
