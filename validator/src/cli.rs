use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[clap(version, about)]
pub struct Cli {
    #[clap(flatten)]
    pub definitions: DefinitionArgs,

    #[clap(short, long, action = clap::ArgAction::Count, global = true, help = "Log more (-v debug, -vv trace)")]
    pub verbose: u8,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Args)]
pub struct DefinitionArgs {
    #[clap(
        long,
        global = true,
        value_parser,
        help = "Root of the NXDL definitions [default: $NEXUS_DEF_PATH or ./definitions]"
    )]
    pub definitions: Option<PathBuf>,

    #[clap(long = "search-dir", global = true, value_parser, help = "Additional directory searched for definitions")]
    pub search_dirs: Vec<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Validate a JSON object of data paths against an application definition
    Validate {
        #[clap(value_parser, help = "The application definition, e.g. NXmpes")]
        appdef: String,

        #[clap(value_parser, help = "JSON file holding the flat mapping")]
        mapping: PathBuf,

        #[clap(long, help = "Do not report keys the definition does not describe")]
        ignore_undocumented: bool,
    },
    /// Validate every entry of a JSON dump of a hierarchical file
    File {
        #[clap(value_parser, help = "JSON file holding the group tree")]
        file: PathBuf,

        #[clap(long, help = "Do not report keys the definition does not describe")]
        ignore_undocumented: bool,
    },
    /// Print the template of an application definition as JSON
    Template {
        #[clap(value_parser)]
        appdef: String,

        #[clap(long, help = "Only print the required keys")]
        required_only: bool,
    },
    /// Print the schema tree of an application definition
    Tree {
        #[clap(value_parser)]
        appdef: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_apply_to_every_subcommand() {
        let cli = Cli::parse_from([
            "nxvalidate",
            "validate",
            "NXtest",
            "data.json",
            "--definitions",
            "/defs",
            "--search-dir",
            "/a",
            "--search-dir",
            "/b",
            "-vv",
        ]);
        assert_eq!(cli.definitions.definitions, Some(PathBuf::from("/defs")));
        assert_eq!(cli.definitions.search_dirs.len(), 2);
        assert_eq!(cli.verbose, 2);
        assert!(matches!(
            cli.command,
            Command::Validate { ignore_undocumented: false, .. }
        ));
    }

    #[test]
    fn template_flags() {
        let cli = Cli::parse_from(["nxvalidate", "template", "NXtest", "--required-only"]);
        assert!(matches!(
            cli.command,
            Command::Template { required_only: true, ref appdef } if appdef == "NXtest"
        ));
    }

    #[test]
    fn command_line_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
