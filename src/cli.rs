use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "cortex-analyzers",
    about = "Cortex analyzers - read a JSON artifact, analyze it, write a JSON report",
    version
)]
pub struct Args {
    /// Analyzer to run
    #[arg(value_enum)]
    pub analyzer: AnalyzerKind,

    /// Read the artifact from this file instead of standard input
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Pretty-print the JSON report
    #[arg(short, long)]
    pub pretty: bool,

    /// Enable verbose logging on standard error
    #[arg(short, long)]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

impl Args {
    /// `env_logger` filter for the chosen verbosity.
    pub fn log_level(&self) -> &'static str {
        if self.quiet {
            "error"
        } else if self.verbose {
            "debug"
        } else {
            "warn"
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
#[value(rename_all = "kebab-case")]
pub enum AnalyzerKind {
    /// Farsight DNSDB passive DNS
    Dnsdb,
    /// DomainTools whois, reverse lookups and reputation
    Domaintools,
    /// VirusTotal reports and submissions
    Virustotal,
    /// AlienVault OTX indicator details
    Otx,
    /// PhishTank URL check
    Phishtank,
    /// Fortinet URL category
    Urlcategory,
    /// Hippocampe threat feed aggregation
    Hippocampe,
    /// MaxMind GeoIP city lookup
    Maxmind,
    /// File type, digests and metadata
    FileInfo,
    /// Windows PE introspection
    PeInfo,
    /// Outlook .msg parsing
    MsgParser,
    /// VBA macro extraction and triage
    Olevba,
}

impl std::fmt::Display for AnalyzerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnalyzerKind::Dnsdb => write!(f, "DNSDB"),
            AnalyzerKind::Domaintools => write!(f, "DomainTools"),
            AnalyzerKind::Virustotal => write!(f, "VirusTotal"),
            AnalyzerKind::Otx => write!(f, "OTXQuery"),
            AnalyzerKind::Phishtank => write!(f, "PhishTank_CheckURL"),
            AnalyzerKind::Urlcategory => write!(f, "URLCategory"),
            AnalyzerKind::Hippocampe => write!(f, "Hippocampe"),
            AnalyzerKind::Maxmind => write!(f, "MaxMind"),
            AnalyzerKind::FileInfo => write!(f, "File_Info"),
            AnalyzerKind::PeInfo => write!(f, "PE_Info"),
            AnalyzerKind::MsgParser => write!(f, "MsgParser"),
            AnalyzerKind::Olevba => write!(f, "Olevba"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_analyzer_names() {
        let args = Args::try_parse_from(["cortex-analyzers", "file-info"]).unwrap();
        assert_eq!(args.analyzer, AnalyzerKind::FileInfo);
        assert_eq!(args.log_level(), "warn");

        let args = Args::try_parse_from(["cortex-analyzers", "msg-parser", "--input", "a.json", "-v"]).unwrap();
        assert_eq!(args.analyzer, AnalyzerKind::MsgParser);
        assert_eq!(args.input, Some(PathBuf::from("a.json")));
        assert_eq!(args.log_level(), "debug");
    }

    #[test]
    fn test_rejects_unknown_analyzer() {
        assert!(Args::try_parse_from(["cortex-analyzers", "shodan"]).is_err());
        assert!(Args::try_parse_from(["cortex-analyzers"]).is_err());
    }

    #[test]
    fn test_quiet_and_verbose_conflict() {
        assert!(Args::try_parse_from(["cortex-analyzers", "otx", "-q", "-v"]).is_err());
        let args = Args::try_parse_from(["cortex-analyzers", "otx", "-q"]).unwrap();
        assert_eq!(args.log_level(), "error");
    }
}
