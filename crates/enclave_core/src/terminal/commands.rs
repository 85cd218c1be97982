//! crates/enclave_core/src/terminal/commands.rs
//!
//! The four command tables. Each terminal type owns a closed set of verbs;
//! parsing a verb yields a typed command and everything else falls through to
//! the table's own "unknown command" wording.

use crate::domain::TerminalType;

/// First whitespace-delimited token (case-folded) and the remaining arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine<'a> {
    pub verb: String,
    pub args: Vec<&'a str>,
}

pub fn tokenize(command: &str) -> Option<CommandLine<'_>> {
    let mut parts = command.split_whitespace();
    let verb = parts.next()?.to_lowercase();
    Some(CommandLine {
        verb,
        args: parts.collect(),
    })
}

/// What a command produced and how it changes the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    pub output: String,
    pub success: bool,
    pub new_directory: Option<String>,
    pub clear_screen: bool,
}

impl CommandOutcome {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            success: true,
            new_directory: None,
            clear_screen: false,
        }
    }

    pub fn fail(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            success: false,
            new_directory: None,
            clear_screen: false,
        }
    }

    pub fn clear() -> Self {
        Self {
            clear_screen: true,
            ..Self::ok("")
        }
    }

    pub fn moved_to(directory: String) -> Self {
        Self {
            new_directory: Some(directory),
            ..Self::ok("")
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Filesystem(FilesystemCommand),
    Military(MilitaryCommand),
    Researcher(ResearcherCommand),
    Emergency(EmergencyCommand),
}

impl Command {
    pub fn parse(terminal_type: TerminalType, verb: &str) -> Option<Self> {
        match terminal_type {
            TerminalType::Filesystem => FilesystemCommand::parse(verb).map(Command::Filesystem),
            TerminalType::Military => MilitaryCommand::parse(verb).map(Command::Military),
            TerminalType::Researcher => ResearcherCommand::parse(verb).map(Command::Researcher),
            TerminalType::Emergency => EmergencyCommand::parse(verb).map(Command::Emergency),
        }
    }
}

pub fn unknown_command(terminal_type: TerminalType, verb: &str) -> CommandOutcome {
    CommandOutcome::fail(match terminal_type {
        TerminalType::Filesystem => format!("Command not found: {verb}. Type 'help' for available commands."),
        TerminalType::Military => format!("Access denied: unrecognized directive '{verb}'"),
        TerminalType::Researcher => format!("Unknown research command: {verb}"),
        TerminalType::Emergency => format!("EMERGENCY PROTOCOL ERROR: '{verb}' not recognized"),
    })
}

/// Commands taking exactly one argument report their usage otherwise.
fn single_argument<'a>(args: &[&'a str], usage: &str) -> Result<&'a str, CommandOutcome> {
    match args {
        [arg] => Ok(arg),
        _ => Err(CommandOutcome::fail(format!("Usage: {usage}"))),
    }
}

//=========================================================================================
// FILESYSTEM
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilesystemCommand {
    List,
    ChangeDirectory,
    Concatenate,
    PrintWorkingDirectory,
    Help,
    Clear,
}

impl FilesystemCommand {
    pub fn parse(verb: &str) -> Option<Self> {
        match verb {
            "ls" | "dir" => Some(Self::List),
            "cd" => Some(Self::ChangeDirectory),
            "cat" | "type" => Some(Self::Concatenate),
            "pwd" => Some(Self::PrintWorkingDirectory),
            "help" => Some(Self::Help),
            "clear" => Some(Self::Clear),
            _ => None,
        }
    }
}

pub const FILESYSTEM_HELP: &str = "\
FILESYSTEM TERMINAL - AVAILABLE COMMANDS
  ls, dir           List the current directory
  cd <path>         Change directory ('..' for parent, '/' for root)
  cat, type <file>  Display a file
  pwd               Print the working directory
  help              Show this help
  clear             Clear the screen";

//=========================================================================================
// MILITARY
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MilitaryCommand {
    Help,
    Status,
    Intel,
    Deploy,
    Recall,
    Clear,
}

impl MilitaryCommand {
    pub fn parse(verb: &str) -> Option<Self> {
        match verb {
            "help" => Some(Self::Help),
            "status" => Some(Self::Status),
            "intel" => Some(Self::Intel),
            "deploy" => Some(Self::Deploy),
            "recall" => Some(Self::Recall),
            "clear" => Some(Self::Clear),
            _ => None,
        }
    }

    pub fn run(self, args: &[&str]) -> CommandOutcome {
        match self {
            Self::Help => CommandOutcome::ok(
                "\
MILITARY COMMAND TERMINAL
  status            Force readiness report
  intel             Latest intelligence summary
  deploy <unit>     Issue a deployment order
  recall <unit>     Recall a deployed unit
  clear             Clear the screen",
            ),
            Self::Status => CommandOutcome::ok(
                "\
=== FORCE READINESS REPORT ===
Perimeter defense ......... ONLINE
Rapid response teams ...... STANDBY
Air surveillance .......... ACTIVE
Containment grid .......... NOMINAL
Threat level .............. ELEVATED",
            ),
            Self::Intel => CommandOutcome::ok(
                "\
=== INTELLIGENCE SUMMARY ===
[0600] Unidentified signal detected on sector 7 relay.
[0745] Patrol Bravo reports no contact along the north ridge.
[0910] Cryptanalysis of intercepted traffic in progress.
Assessment: activity consistent with reconnaissance. Maintain posture.",
            ),
            Self::Deploy => match single_argument(args, "deploy <unit>") {
                Ok(unit) => CommandOutcome::ok(format!(
                    "DEPLOYMENT ORDER ACKNOWLEDGED\nUnit: {unit}\nStatus: EN ROUTE\nETA: 15 minutes"
                )),
                Err(usage) => usage,
            },
            Self::Recall => match single_argument(args, "recall <unit>") {
                Ok(unit) => CommandOutcome::ok(format!(
                    "RECALL ORDER ACKNOWLEDGED\nUnit: {unit}\nStatus: RETURNING TO BASE"
                )),
                Err(usage) => usage,
            },
            Self::Clear => CommandOutcome::clear(),
        }
    }
}

//=========================================================================================
// RESEARCHER
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResearcherCommand {
    Help,
    Status,
    Experiments,
    Analyze,
    Clear,
}

impl ResearcherCommand {
    pub fn parse(verb: &str) -> Option<Self> {
        match verb {
            "help" => Some(Self::Help),
            "status" => Some(Self::Status),
            "experiments" => Some(Self::Experiments),
            "analyze" => Some(Self::Analyze),
            "clear" => Some(Self::Clear),
            _ => None,
        }
    }

    pub fn run(self, args: &[&str]) -> CommandOutcome {
        match self {
            Self::Help => CommandOutcome::ok(
                "\
RESEARCH TERMINAL
  status            Laboratory status
  experiments       Active experiment registry
  analyze <sample>  Queue a sample for analysis
  clear             Clear the screen",
            ),
            Self::Status => CommandOutcome::ok(
                "\
=== LABORATORY STATUS ===
Lab A (Materials) ......... OPERATIONAL
Lab B (Biology) ........... OPERATIONAL
Lab C (Energy) ............ MAINTENANCE
Containment ............... STABLE
Staff on site ............. 14",
            ),
            Self::Experiments => CommandOutcome::ok(
                "\
=== ACTIVE EXPERIMENTS ===
EXP-001  Phoenix alloy stress testing ........ PHASE 3
EXP-014  Adaptive polymer synthesis .......... PHASE 1
EXP-022  Low-temperature plasma containment .. SUSPENDED",
            ),
            Self::Analyze => match single_argument(args, "analyze <sample>") {
                Ok(sample) => CommandOutcome::ok(format!(
                    "ANALYSIS QUEUED\nSample: {sample}\nSpectrometry: pending\nEstimated completion: 2 hours"
                )),
                Err(usage) => usage,
            },
            Self::Clear => CommandOutcome::clear(),
        }
    }
}

//=========================================================================================
// EMERGENCY
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmergencyCommand {
    Help,
    Status,
    Lockdown,
    Evacuate,
    Override,
    Clear,
}

impl EmergencyCommand {
    pub fn parse(verb: &str) -> Option<Self> {
        match verb {
            "help" => Some(Self::Help),
            "status" => Some(Self::Status),
            "lockdown" => Some(Self::Lockdown),
            "evacuate" => Some(Self::Evacuate),
            "override" => Some(Self::Override),
            "clear" => Some(Self::Clear),
            _ => None,
        }
    }

    pub fn run(self, args: &[&str]) -> CommandOutcome {
        match self {
            Self::Help => CommandOutcome::ok(
                "\
EMERGENCY CONTROL TERMINAL
  status            Facility emergency status
  lockdown          Initiate facility lockdown
  evacuate          Initiate evacuation procedure
  override <code>   Submit an override code
  clear             Clear the screen",
            ),
            Self::Status => CommandOutcome::ok(
                "\
=== EMERGENCY STATUS ===
Alert level ............... GREEN
Blast doors ............... OPEN
Backup power .............. CHARGED
Evacuation routes ......... CLEAR",
            ),
            Self::Lockdown => CommandOutcome::ok(
                "\
!!! FACILITY LOCKDOWN INITIATED !!!
All blast doors sealing.
Personnel remain at current stations.
Awaiting command authorization to lift.",
            ),
            Self::Evacuate => CommandOutcome::ok(
                "\
!!! EVACUATION PROCEDURE INITIATED !!!
Proceed to the nearest marked exit.
Do not use elevators.
Muster point: Sector 1 landing pad.",
            ),
            Self::Override => match single_argument(args, "override <code>") {
                Ok(code) => CommandOutcome::ok(format!(
                    "OVERRIDE CODE RECEIVED: {code}\nVerification pending with command staff."
                )),
                Err(usage) => usage,
            },
            Self::Clear => CommandOutcome::clear(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_folds_the_verb_only() {
        let line = tokenize("  DEPLOY Alpha-Team ").unwrap();
        assert_eq!(line.verb, "deploy");
        assert_eq!(line.args, ["Alpha-Team"]);
        assert!(tokenize("   ").is_none());
    }

    #[test]
    fn tables_are_disjoint_by_terminal_type() {
        assert_eq!(
            Command::parse(TerminalType::Filesystem, "dir"),
            Some(Command::Filesystem(FilesystemCommand::List))
        );
        assert_eq!(Command::parse(TerminalType::Military, "ls"), None);
        assert_eq!(Command::parse(TerminalType::Researcher, "deploy"), None);
        assert_eq!(
            Command::parse(TerminalType::Emergency, "lockdown"),
            Some(Command::Emergency(EmergencyCommand::Lockdown))
        );
    }

    #[test]
    fn unknown_verbs_fail_with_table_specific_wording() {
        let fs = unknown_command(TerminalType::Filesystem, "rm");
        let mil = unknown_command(TerminalType::Military, "rm");
        assert!(!fs.success && !mil.success);
        assert!(fs.output.starts_with("Command not found"));
        assert!(mil.output.starts_with("Access denied"));
    }

    #[test]
    fn deploy_checks_arity_and_echoes_the_unit() {
        let ok = MilitaryCommand::Deploy.run(&["bravo"]);
        assert!(ok.success);
        assert!(ok.output.contains("Unit: bravo"));

        let missing = MilitaryCommand::Deploy.run(&[]);
        assert!(!missing.success);
        assert_eq!(missing.output, "Usage: deploy <unit>");

        assert!(!MilitaryCommand::Deploy.run(&["a", "b"]).success);
    }

    #[test]
    fn canned_reports_succeed() {
        assert!(ResearcherCommand::Experiments.run(&[]).output.contains("EXP-001"));
        assert!(EmergencyCommand::Lockdown.run(&[]).success);
        assert!(EmergencyCommand::Clear.run(&[]).clear_screen);
        assert!(ResearcherCommand::Analyze.run(&["S-19"]).output.contains("S-19"));
    }
}
