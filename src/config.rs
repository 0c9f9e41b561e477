use clap::Parser;

/// Runtime configuration for the ingestion engine.
///
/// Values come from the CLI by default; any of them can be overridden
/// by an environment variable of the same name, upper-cased and
/// prefixed with `CRASH_COLLECTOR_` (e.g. `CRASH_COLLECTOR_DUMP_FIELD`),
/// mirroring the env-over-default layering Antenna used via Everett.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Name of the field in the POST data that holds the main dump.
    #[arg(long, default_value = "upload_file_minidump")]
    pub dump_field: String,

    /// Prefix prepended to crash ids in responses and used as the type tag.
    #[arg(long, default_value = "bp-")]
    pub dump_id_prefix: String,

    /// Number of crashmover workers draining the queue per process.
    #[arg(long, default_value_t = 2, value_parser = positive_usize)]
    pub concurrent_crashmovers: usize,

    /// Address to bind the HTTP server to.
    #[arg(long, default_value = "0.0.0.0:8080")]
    pub bind: String,

    /// Path to the sqlite database used for ingestion-event bookkeeping.
    #[arg(long, default_value = "/tmp/crash-collector.db")]
    pub db_path: String,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub dump_field: String,
    pub dump_id_prefix: String,
    pub concurrent_crashmovers: usize,
    pub bind: String,
    pub db_path: String,
}

impl Settings {
    pub fn from_args(args: Args) -> Self {
        Settings {
            dump_field: env_override("DUMP_FIELD", args.dump_field),
            dump_id_prefix: env_override("DUMP_ID_PREFIX", args.dump_id_prefix),
            concurrent_crashmovers: env_override_usize(
                "CONCURRENT_CRASHMOVERS",
                args.concurrent_crashmovers,
            ),
            bind: env_override("BIND", args.bind),
            db_path: env_override("DB_PATH", args.db_path),
        }
    }

    /// `type_tag` is the configured prefix with leading/trailing `-`
    /// stripped, per spec.
    pub fn type_tag(&self) -> String {
        self.dump_id_prefix.trim_matches('-').to_string()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            dump_field: "upload_file_minidump".to_string(),
            dump_id_prefix: "bp-".to_string(),
            concurrent_crashmovers: 2,
            bind: "0.0.0.0:8080".to_string(),
            db_path: "/tmp/crash-collector.db".to_string(),
        }
    }
}

fn env_override(name: &str, default: String) -> String {
    std::env::var(format!("CRASH_COLLECTOR_{name}")).unwrap_or(default)
}

/// Mirrors Antenna's `positive_int` Everett parser: rejects `0` and
/// anything that doesn't parse as a plain integer at the CLI layer,
/// rather than letting it through to spawn zero crashmover workers.
fn positive_usize(s: &str) -> Result<usize, String> {
    let value: usize = s.parse().map_err(|_| format!("`{s}` is not a valid integer"))?;
    if value >= 1 {
        Ok(value)
    } else {
        Err("must be a positive integer (>= 1)".to_string())
    }
}

fn env_override_usize(name: &str, default: usize) -> usize {
    std::env::var(format!("CRASH_COLLECTOR_{name}"))
        .ok()
        .and_then(|v| v.parse().ok())
        .filter(|v| *v >= 1)
        .unwrap_or(default)
}
