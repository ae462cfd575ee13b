use anyhow::Result;
use clap::{Parser, Subcommand};

// D-Bus proxy: `#[zbus::proxy]` generates `LookoutProxy` (async) and
// `LookoutProxyBlocking`. Only the async variant is used here.
#[zbus::proxy(
    interface = "org.freedesktop.Lookout1",
    default_service = "org.freedesktop.Lookout1",
    default_path = "/org/freedesktop/Lookout1"
)]
trait Lookout {
    async fn report_detection(
        &self,
        user: &str,
        encoding: Vec<f64>,
        image_ref: &str,
        category: &str,
        timestamp: &str,
    ) -> zbus::Result<String>;
    async fn list_detections(&self, user: &str) -> zbus::Result<String>;
    async fn assign_detection(
        &self,
        user: &str,
        id: &str,
        assign_to: &str,
        category: &str,
    ) -> zbus::Result<String>;
    async fn mark_processed(&self, user: &str, id: &str) -> zbus::Result<String>;
    async fn delete_detection(&self, user: &str, id: &str) -> zbus::Result<bool>;
    async fn clear_cache(&self, user: &str) -> zbus::Result<u32>;
    async fn cache_status(&self, user: &str) -> zbus::Result<String>;
    async fn sweep_cache(&self, max_age_secs: u64, max_entries: u32) -> zbus::Result<String>;
    async fn status(&self) -> zbus::Result<String>;
}

#[derive(Parser)]
#[command(name = "lookout", about = "Lookout unknown-person detection CLI")]
struct Cli {
    /// Talk to a daemon on the session bus instead of the system bus
    #[arg(long, global = true)]
    session: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Report a detection as the recognition service would
    Report {
        #[arg(short, long)]
        user: String,
        /// Image URL or storage reference for the captured frame
        #[arg(short, long)]
        image: String,
        /// Comma-separated face encoding (omit if none was produced)
        #[arg(short, long, value_delimiter = ',', allow_hyphen_values = true)]
        encoding: Vec<f64>,
        #[arg(short, long, default_value = "")]
        category: String,
        /// RFC 3339 timestamp (defaults to now)
        #[arg(short, long, default_value = "")]
        timestamp: String,
    },
    /// List recent detections
    List {
        #[arg(short, long)]
        user: String,
    },
    /// Assign a detection to a family member and/or category
    Assign {
        #[arg(short, long)]
        user: String,
        /// Detection record ID
        id: String,
        /// Family member this face belongs to
        #[arg(long, default_value = "")]
        to: String,
        #[arg(short, long, default_value = "")]
        category: String,
    },
    /// Mark a detection processed without changing its classification
    Process {
        #[arg(short, long)]
        user: String,
        /// Detection record ID
        id: String,
    },
    /// Delete a detection record
    Delete {
        #[arg(short, long)]
        user: String,
        /// Detection record ID
        id: String,
    },
    /// Forget every cached face for a user
    ClearCache {
        #[arg(short, long)]
        user: String,
    },
    /// Show the duplicate-suppression cache for a user
    CacheStatus {
        #[arg(short, long)]
        user: String,
    },
    /// Evict old cache entries (0 = no limit)
    Sweep {
        #[arg(long, default_value_t = 0)]
        max_age_secs: u64,
        #[arg(long, default_value_t = 0)]
        max_entries: u32,
    },
    /// Show daemon status
    Status,
}

/// Re-indent a JSON reply; falls back to the raw string.
fn pretty(raw: &str) -> String {
    serde_json::from_str::<serde_json::Value>(raw)
        .and_then(|v| serde_json::to_string_pretty(&v))
        .unwrap_or_else(|_| raw.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let conn = if cli.session {
        zbus::Connection::session().await?
    } else {
        zbus::Connection::system().await?
    };
    let proxy = LookoutProxy::new(&conn).await?;
    tracing::debug!(session = cli.session, "connected to lookoutd");

    match cli.command {
        Commands::Report {
            user,
            image,
            encoding,
            category,
            timestamp,
        } => {
            let reply = proxy
                .report_detection(&user, encoding, &image, &category, &timestamp)
                .await?;
            println!("{}", pretty(&reply));
        }
        Commands::List { user } => {
            println!("{}", pretty(&proxy.list_detections(&user).await?));
        }
        Commands::Assign {
            user,
            id,
            to,
            category,
        } => {
            let reply = proxy.assign_detection(&user, &id, &to, &category).await?;
            println!("{}", pretty(&reply));
        }
        Commands::Process { user, id } => {
            println!("{}", pretty(&proxy.mark_processed(&user, &id).await?));
        }
        Commands::Delete { user, id } => {
            if proxy.delete_detection(&user, &id).await? {
                println!("Deleted {id}");
            } else {
                println!("No detection with id {id}");
            }
        }
        Commands::ClearCache { user } => {
            let removed = proxy.clear_cache(&user).await?;
            println!("Cleared {removed} cached face(s) for {user}");
        }
        Commands::CacheStatus { user } => {
            println!("{}", pretty(&proxy.cache_status(&user).await?));
        }
        Commands::Sweep {
            max_age_secs,
            max_entries,
        } => {
            let reply = proxy.sweep_cache(max_age_secs, max_entries).await?;
            println!("{}", pretty(&reply));
        }
        Commands::Status => {
            println!("{}", pretty(&proxy.status().await?));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_report_parses_negative_encoding() {
        let cli = Cli::try_parse_from([
            "lookout", "report", "-u", "alice", "-i", "img.jpg", "-e", "-0.5,0.25,1",
        ])
        .unwrap();
        match cli.command {
            Commands::Report { encoding, category, .. } => {
                assert_eq!(encoding, vec![-0.5, 0.25, 1.0]);
                assert!(category.is_empty());
            }
            _ => panic!("expected report"),
        }
    }

    #[test]
    fn test_report_without_encoding() {
        let cli = Cli::try_parse_from(["lookout", "report", "-u", "alice", "-i", "img.jpg"]).unwrap();
        match cli.command {
            Commands::Report { encoding, .. } => assert!(encoding.is_empty()),
            _ => panic!("expected report"),
        }
    }

    #[test]
    fn test_process_parses_record_id() {
        let cli = Cli::try_parse_from(["lookout", "process", "-u", "alice", "rec-42"]).unwrap();
        match cli.command {
            Commands::Process { user, id } => {
                assert_eq!(user, "alice");
                assert_eq!(id, "rec-42");
            }
            _ => panic!("expected process"),
        }
    }

    #[test]
    fn test_session_flag_is_global() {
        let cli = Cli::try_parse_from(["lookout", "status", "--session"]).unwrap();
        assert!(cli.session);
    }

    #[test]
    fn test_pretty_passes_through_non_json() {
        assert_eq!(pretty("not json"), "not json");
        assert_eq!(pretty("{\"a\":1}"), "{\n  \"a\": 1\n}");
    }
}
