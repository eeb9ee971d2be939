//! Connection handling for libsql databases (local files or remote servers)

use libsql::{Builder, Connection, Database};
use tracing::info;

/// Owns a libsql database and the connection every query goes through
pub struct LibsqlBackend {
    _db: Database,
    conn: Connection,
    url: String,
}

impl LibsqlBackend {
    /// Open a database from a URL
    ///
    /// `libsql://`, `http://` and `https://` URLs connect to a remote server
    /// using `auth_token`. Anything else is a local path, with an optional
    /// `file:` prefix.
    pub async fn open(url: &str, auth_token: Option<&str>) -> libsql::Result<Self> {
        let db = if is_remote_url(url) {
            Builder::new_remote(url.to_string(), auth_token.unwrap_or_default().to_string())
                .build()
                .await?
        } else {
            Builder::new_local(local_path(url)).build().await?
        };
        let conn = db.connect()?;

        info!("[LibsqlBackend] Opened database {}", url);
        Ok(Self {
            _db: db,
            conn,
            url: url.to_string(),
        })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

fn is_remote_url(url: &str) -> bool {
    ["libsql://", "http://", "https://"]
        .iter()
        .any(|scheme| url.starts_with(scheme))
}

fn local_path(url: &str) -> &str {
    url.strip_prefix("file:").unwrap_or(url)
}

/// Quote an identifier for interpolation into SQL
///
/// Identifiers reaching this point are validated by the entity registry;
/// quoting keeps reserved words such as `order` usable as table names.
pub(crate) fn quote_identifier(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_classification() {
        assert!(is_remote_url("libsql://risk-db.turso.io"));
        assert!(is_remote_url("https://risk-db.example.com"));
        assert!(!is_remote_url("file:state.db"));
        assert_eq!(local_path("file:state.db"), "state.db");
        assert_eq!(local_path("/var/lib/tidemark/state.db"), "/var/lib/tidemark/state.db");
    }

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("incidents"), "\"incidents\"");
        assert_eq!(quote_identifier("we\"ird"), "\"we\"\"ird\"");
    }
}
