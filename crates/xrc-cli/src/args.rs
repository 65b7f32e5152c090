use clap::{Parser, Subcommand};

const EXAMPLES: &str = "\
Example:
  xrc --url https://your-subscription-url --sub --ping
  xrc --socks 1088 --http 1099 start";

/// 命令行参数
#[derive(Debug, Clone, Default, Parser)]
#[command(name = "xrc", version, about = "A xray client.", after_help = EXAMPLES)]
pub struct Cli {
    /// Show more logs
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Retrieve subscriptions
    #[arg(long)]
    pub sub: bool,

    /// Test node delay
    #[arg(long)]
    pub ping: bool,

    /// Filter test nodes (regular expression on the node name)
    #[arg(short = 'f', long = "filter", value_name = "REGEX")]
    pub filter: Option<String>,

    /// Append subscription address
    #[arg(long, value_name = "URL")]
    pub url: Option<String>,

    /// Set socks proxy port
    #[arg(long, value_name = "PORT", value_parser = clap::value_parser!(u16).range(1..))]
    pub socks: Option<u16>,

    /// Set http proxy port
    #[arg(long, value_name = "PORT", value_parser = clap::value_parser!(u16).range(1..))]
    pub http: Option<u16>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// 子命令
#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Start proxy
    Start,
    /// View configuration details
    Ls,
    /// Remove subscription
    Rmu {
        /// Index shown by `ls`
        index: usize,
    },
    /// Remove filter
    Rmf {
        /// Index shown by `ls`
        index: usize,
    },
}

impl Cli {
    /// 没有任何参数时只显示帮助
    pub fn is_empty(&self) -> bool {
        self.command.is_none()
            && !self.sub
            && !self.ping
            && self.filter.is_none()
            && self.url.is_none()
            && self.socks.is_none()
            && self.http.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flags_and_command() {
        let cli = Cli::try_parse_from([
            "xrc", "-v", "--url", "https://sub.example.com", "-f", "香港|HK", "--socks", "1088", "--http",
            "1099", "start",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.url.as_deref(), Some("https://sub.example.com"));
        assert_eq!(cli.filter.as_deref(), Some("香港|HK"));
        assert_eq!(cli.socks, Some(1088));
        assert_eq!(cli.http, Some(1099));
        assert_eq!(cli.command, Some(Command::Start));
    }

    #[test]
    fn remove_commands_take_an_index() {
        let cli = Cli::try_parse_from(["xrc", "rmu", "2"]).unwrap();
        assert_eq!(cli.command, Some(Command::Rmu { index: 2 }));
        assert!(Cli::try_parse_from(["xrc", "rmf"]).is_err());
        assert!(Cli::try_parse_from(["xrc", "rmf", "x"]).is_err());
    }

    #[test]
    fn port_zero_is_rejected() {
        assert!(Cli::try_parse_from(["xrc", "--socks", "0"]).is_err());
    }

    #[test]
    fn empty_invocation() {
        assert!(Cli::try_parse_from(["xrc"]).unwrap().is_empty());
        assert!(!Cli::try_parse_from(["xrc", "--ping"]).unwrap().is_empty());
    }
}
