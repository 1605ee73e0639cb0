use crate::CommandLineArguments;
use phasec_resolve::SessionConfig;
use phasec_tree::ResolvePhase;

/// Command line flags merged over the manifest's `[session]` table.
#[derive(Debug, Clone)]
pub struct Config {
    pub phase: ResolvePhase,
    pub targets: Vec<String>,
    pub threads: usize,
    pub dump: bool,
    pub session: SessionConfig,
}

impl Config {
    pub fn new(arguments: &CommandLineArguments, mut session: SessionConfig) -> Config {
        if arguments.verify {
            session.verify = true;
        } else if arguments.no_verify {
            session.verify = false;
        }
        if arguments.collect_context {
            session.collect_context = true;
        }
        Config {
            phase: arguments.phase,
            targets: arguments.targets.clone(),
            threads: arguments.threads.max(1),
            dump: arguments.dump,
            session,
        }
    }
}
