use clap::{ArgAction, Args, Parser, Subcommand};
use std::net::IpAddr;
use std::path::PathBuf;

use crate::config::{
    MirrorConfig, DEFAULT_MAX_CONCURRENT, DEFAULT_OUTPUT_DIR, DEFAULT_TIMEOUT_SECS,
    DEFAULT_USER_AGENT,
};

#[derive(Parser, Debug)]
#[command(
    name = "page-mirror",
    about = "Mirror a single web page and its static assets for offline use",
    version,
    long_about = "Downloads one page together with the stylesheets, scripts, images and stylesheet-referenced resources it uses, and rewrites every reference to point at the local copy."
)]
pub struct MirrorCommand {
    #[command(subcommand)]
    pub command: Command,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Mirror one page and exit
    Mirror(MirrorArgs),
    /// Serve the HTTP and WebSocket mirror endpoints
    Serve(ServeArgs),
}

#[derive(Args, Debug)]
pub struct MirrorArgs {
    /// The URL of the page to mirror
    #[arg(required = true)]
    pub url: String,

    #[command(flatten)]
    pub engine: EngineArgs,
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1")]
    pub host: IpAddr,

    /// Port to listen on
    #[arg(short, long, default_value = "8001")]
    pub port: u16,

    #[command(flatten)]
    pub engine: EngineArgs,
}

#[derive(Args, Debug)]
pub struct EngineArgs {
    /// Output directory for the mirrored page
    #[arg(short, long, default_value = DEFAULT_OUTPUT_DIR)]
    pub output_dir: PathBuf,

    /// Maximum concurrent downloads
    #[arg(short = 'c', long, default_value_t = DEFAULT_MAX_CONCURRENT, value_parser = parse_positive)]
    pub max_concurrent: usize,

    /// Timeout for requests in seconds
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS, value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: u64,

    /// User agent string to use for requests
    #[arg(long, default_value = DEFAULT_USER_AGENT)]
    pub user_agent: String,

    /// Keep files apart when two URLs map to the same local name
    #[arg(long)]
    pub disambiguate_collisions: bool,
}

impl EngineArgs {
    pub fn to_config(&self) -> MirrorConfig {
        MirrorConfig {
            output_dir: self.output_dir.clone(),
            max_concurrent: self.max_concurrent,
            timeout_secs: self.timeout,
            user_agent: self.user_agent.clone(),
            disambiguate_collisions: self.disambiguate_collisions,
        }
    }
}

fn parse_positive(value: &str) -> Result<usize, String> {
    match value.parse::<usize>() {
        Ok(0) => Err("must be at least 1".to_string()),
        Ok(n) => Ok(n),
        Err(e) => Err(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mirror_args(args: &[&str]) -> MirrorArgs {
        match MirrorCommand::try_parse_from(args).unwrap().command {
            Command::Mirror(args) => args,
            other => panic!("expected mirror subcommand, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_basic_args() {
        let args = mirror_args(&["page-mirror", "mirror", "https://example.com", "-o", "./output"]);

        assert_eq!(args.url, "https://example.com");
        assert_eq!(args.engine.output_dir, PathBuf::from("./output"));
        assert_eq!(args.engine.max_concurrent, 8);
        assert_eq!(args.engine.timeout, 30);
        assert!(!args.engine.disambiguate_collisions);
    }

    #[test]
    fn test_defaults_match_config() {
        let args = mirror_args(&["page-mirror", "mirror", "https://example.com"]);
        assert_eq!(args.engine.to_config(), MirrorConfig::default());
    }

    #[test]
    fn test_parse_all_args() {
        let args = mirror_args(&[
            "page-mirror",
            "mirror",
            "https://example.com",
            "-o",
            "./output",
            "-c",
            "20",
            "--timeout",
            "5",
            "--user-agent",
            "Test/2.0",
            "--disambiguate-collisions",
        ]);

        let config = args.engine.to_config();
        assert_eq!(config.output_dir, PathBuf::from("./output"));
        assert_eq!(config.max_concurrent, 20);
        assert_eq!(config.timeout_secs, 5);
        assert_eq!(config.user_agent, "Test/2.0");
        assert!(config.disambiguate_collisions);
    }

    #[test]
    fn test_parse_serve() {
        let parsed = MirrorCommand::try_parse_from(["page-mirror", "-v", "serve", "--port", "9000"]).unwrap();
        assert_eq!(parsed.verbose, 1);
        match parsed.command {
            Command::Serve(args) => {
                assert_eq!(args.port, 9000);
                assert_eq!(args.host.to_string(), "127.0.0.1");
                assert_eq!(args.engine.output_dir, PathBuf::from("copied_website"));
            }
            other => panic!("expected serve subcommand, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_missing_url() {
        let result = MirrorCommand::try_parse_from(["page-mirror", "mirror", "-o", "./output"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_invalid_concurrent() {
        let result = MirrorCommand::try_parse_from(["page-mirror", "mirror", "https://example.com", "-c", "0"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_invalid_timeout() {
        let result = MirrorCommand::try_parse_from([
            "page-mirror",
            "mirror",
            "https://example.com",
            "--timeout",
            "0",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_quiet_conflicts_with_verbose() {
        let result = MirrorCommand::try_parse_from(["page-mirror", "-q", "-v", "mirror", "https://example.com"]);
        assert!(result.is_err());
    }
}
