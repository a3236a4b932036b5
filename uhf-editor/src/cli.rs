use chrono::{NaiveDate, NaiveTime};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Parser, Debug)]
#[command(version, author = "UHF SCHEDULER AUTHORS", about = "UHF Editor\nLicensed under AGPLv3\nEdits UHF channel schedules from the command line", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    pub config: Option<String>,

    /// Generate a default configuration template to stdout
    #[arg(long)]
    pub generate_config: bool,

    /// Channel directory (overrides `[channel] default_dir`)
    #[arg(short = 'C', long, global = true)]
    pub channel: Option<PathBuf>,

    /// Skip files that cannot be found instead of asking where they are
    #[arg(long, global = true)]
    pub decline_missing: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// A day given either as an ordinal or as a calendar date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayRef {
    Ordinal(i64),
    Date(NaiveDate),
}

impl FromStr for DayRef {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
            return Ok(DayRef::Date(date));
        }
        s.parse::<i64>()
            .map(DayRef::Ordinal)
            .map_err(|_| format!("\"{}\" is neither a day number nor a YYYY-MM-DD date", s))
    }
}

fn parse_time(s: &str) -> Result<NaiveTime, String> {
    uhf_engine::timefmt::parse_time_of_day(s)
        .ok_or_else(|| format!("\"{}\" is not a HH:MM time", s))
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Title,
    Year,
    Series,
    Order,
    Description,
    /// Start offset as HH:MM:SS
    Offset,
    Path,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a new channel of empty weeks
    New {
        #[arg(long, default_value_t = 1)]
        weeks: usize,
        /// First day of the first week (YYYY-MM-DD)
        #[arg(long)]
        start: NaiveDate,
    },
    /// Show channel information
    Info,
    /// Show the programs of a day, resolving missing durations first
    Day { day: DayRef },
    /// Resolve missing durations of a day
    Resolve { day: DayRef },
    /// Schedule a media file
    Add {
        day: DayRef,
        #[arg(value_parser = parse_time)]
        time: NaiveTime,
        file: PathBuf,
        #[arg(long)]
        category: Option<String>,
    },
    /// Change the start time of a program
    Move {
        day: DayRef,
        #[arg(value_parser = parse_time)]
        from: NaiveTime,
        #[arg(value_parser = parse_time)]
        to: NaiveTime,
    },
    /// Move a program by a number of minutes
    #[command(allow_negative_numbers = true)]
    Shift {
        day: DayRef,
        #[arg(value_parser = parse_time)]
        time: NaiveTime,
        #[arg(allow_hyphen_values = true)]
        minutes: i64,
    },
    /// Remove a program
    Delete {
        day: DayRef,
        #[arg(value_parser = parse_time)]
        time: NaiveTime,
    },
    /// Rename the resource identifier of a program
    Rekey {
        day: DayRef,
        #[arg(value_parser = parse_time)]
        time: NaiveTime,
        new_id: String,
    },
    /// Edit the resource of a program; leaving out the value clears it
    Set {
        day: DayRef,
        #[arg(value_parser = parse_time)]
        time: NaiveTime,
        #[arg(value_enum)]
        field: Field,
        value: Option<String>,
    },
    /// List the media files in a directory that can be scheduled
    Scan { dir: PathBuf },
    /// Report broken references and bad paths
    Validate,
    /// Probe every resource again and fix stored durations
    FixDurations,
    /// Write the resource database as JSON
    ExportResources {
        #[arg(default_value = "resources.json")]
        output: PathBuf,
    },
    /// Move every schedule by a number of days
    #[command(allow_negative_numbers = true)]
    Offset {
        #[arg(allow_hyphen_values = true, default_value_t = 364)]
        days: i64,
    },
    /// Set the beginning of the broadcast day (HH:MM)
    Bobd { time: String },
    /// Create a filler list
    ListNew {
        id: String,
        path: String,
        #[arg(long)]
        title: Option<String>,
    },
    /// Add a media file to a list
    ListAdd { id: String, file: PathBuf },
    /// Remove entries from a list by key
    ListRemove {
        id: String,
        #[arg(required = true)]
        keys: Vec<String>,
    },
    /// Add a series
    SeriesAdd { id: String, title: String },
}

impl Command {
    pub fn is_mutating(&self) -> bool {
        !matches!(
            self,
            Command::Info
                | Command::Scan { .. }
                | Command::Validate
                | Command::ExportResources { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_day_ref_parsing() {
        assert_eq!("12".parse::<DayRef>(), Ok(DayRef::Ordinal(12)));
        assert_eq!(
            "2024-09-03".parse::<DayRef>(),
            Ok(DayRef::Date(NaiveDate::from_ymd_opt(2024, 9, 3).unwrap()))
        );
        assert!("tuesday".parse::<DayRef>().is_err());
    }

    #[test]
    fn test_parse_add() {
        let cli = Cli::try_parse_from([
            "uhf-editor",
            "-C",
            "/tv/38",
            "add",
            "2024-09-03",
            "20:30",
            "movies/Alien.mkv",
            "--category",
            "late",
        ])
        .unwrap();
        assert_eq!(cli.channel, Some(PathBuf::from("/tv/38")));
        match cli.command {
            Some(Command::Add {
                time, category, ..
            }) => {
                assert_eq!(time, NaiveTime::from_hms_opt(20, 30, 0).unwrap());
                assert_eq!(category.as_deref(), Some("late"));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_negative_shift() {
        let cli = Cli::try_parse_from(["uhf-editor", "shift", "3", "09:00", "-30"]).unwrap();
        assert!(matches!(cli.command, Some(Command::Shift { minutes: -30, .. })));
    }

    #[test]
    fn test_bad_time_is_rejected() {
        assert!(Cli::try_parse_from(["uhf-editor", "delete", "3", "9 o'clock"]).is_err());
    }

    #[test]
    fn test_set_without_value_clears() {
        let cli = Cli::try_parse_from(["uhf-editor", "set", "0", "06:00", "year"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Command::Set {
                field: Field::Year,
                value: None,
                ..
            })
        ));
    }

    #[test]
    fn test_generate_config_needs_no_command() {
        let cli = Cli::try_parse_from(["uhf-editor", "--generate-config"]).unwrap();
        assert!(cli.generate_config);
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_mutating_commands() {
        assert!(!Command::Info.is_mutating());
        assert!(Command::Offset { days: 7 }.is_mutating());
    }
}
