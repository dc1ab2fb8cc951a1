//! Command-line interface definitions and parsing.

use std::path::PathBuf;

use clap::Parser;

/// Register a BLE advertisement with BlueZ and keep it alive until SIGINT/SIGTERM.
#[derive(Debug, Parser)]
#[command(name = "bleadvert", author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path (default: /etc/bleadvert/config.toml)
    #[arg(short, long, env = "BLEADVERT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log for systemd: compact stdout plus JSON files
    #[arg(long)]
    pub production: bool,

    /// Print the properties the advertisement would export, then exit
    #[arg(long)]
    pub print_properties: bool,

    /// Write the built-in default configuration to PATH, then exit
    #[arg(long, value_name = "PATH", conflicts_with = "print_properties")]
    pub write_default_config: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_flags() {
        let cli = Cli::try_parse_from([
            "bleadvert",
            "--config",
            "/tmp/ad.toml",
            "--print-properties",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/ad.toml")));
        assert!(cli.print_properties);
        assert!(!cli.production);
    }

    #[test]
    fn test_print_and_write_conflict() {
        let result = Cli::try_parse_from([
            "bleadvert",
            "--print-properties",
            "--write-default-config",
            "out.toml",
        ]);
        assert!(result.is_err());
    }
}
