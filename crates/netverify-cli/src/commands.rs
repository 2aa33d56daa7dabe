//! Dispatch of subcommands to the property checker.

use std::fs;
use std::path::Path;

use miette::{IntoDiagnostic, WrapErr};
use serde::Serialize;
use tracing::info;

use netverify_engine::{z3_checker, CheckOptions};
use netverify_model::{EnvironmentType, Network, Question, TieBreak};

use crate::cli::{Cli, Commands, Inputs};

/// Run the selected check and render its answer as pretty JSON.
pub(crate) fn run(cli: &Cli) -> miette::Result<String> {
    let options = CheckOptions {
        workers: cli.workers.max(1),
        timeout_secs: cli.timeout,
        dump_smt: cli.dump_smt.clone(),
    };
    let inputs = inputs_of(&cli.command);
    let network = load_network(&inputs.network)?;
    let question = load_question(inputs)?;
    info!(
        routers = network.routers.len(),
        workers = options.workers,
        "network loaded"
    );
    let checker = z3_checker(&network, options).into_diagnostic()?;

    match &cli.command {
        Commands::Forwarding { .. } => render(&checker.compute_forwarding(&question).into_diagnostic()?),
        Commands::Reachability { .. } => render(&checker.compute_reachability(&question).into_diagnostic()?),
        Commands::BoundedLength { k, .. } => {
            render(&checker.compute_bounded_length(&question, *k).into_diagnostic()?)
        }
        Commands::EqualLength { .. } => render(&checker.compute_equal_length(&question).into_diagnostic()?),
        Commands::LoadBalance { k, .. } => {
            render(&checker.compute_load_balance(&question, *k).into_diagnostic()?)
        }
        Commands::BlackHole { .. } => render(&checker.compute_black_hole(&question).into_diagnostic()?),
        Commands::Multipath { .. } => {
            render(&checker.compute_multipath_consistency(&question).into_diagnostic()?)
        }
        Commands::RoutingLoop { .. } => render(&checker.compute_routing_loop(&question).into_diagnostic()?),
        Commands::Determinism { .. } => render(&checker.compute_determinism(&question).into_diagnostic()?),
        Commands::LocalConsistency { routers, strict, .. } => render(
            &checker
                .compute_local_consistency(&question, routers, *strict)
                .into_diagnostic()?,
        ),
    }
}

fn inputs_of(command: &Commands) -> &Inputs {
    match command {
        Commands::Forwarding { inputs }
        | Commands::Reachability { inputs }
        | Commands::BoundedLength { inputs, .. }
        | Commands::EqualLength { inputs }
        | Commands::LoadBalance { inputs, .. }
        | Commands::BlackHole { inputs }
        | Commands::Multipath { inputs }
        | Commands::RoutingLoop { inputs }
        | Commands::Determinism { inputs }
        | Commands::LocalConsistency { inputs, .. } => inputs,
    }
}

fn load_network(path: &Path) -> miette::Result<Network> {
    let src = fs::read_to_string(path)
        .into_diagnostic()
        .wrap_err_with(|| format!("cannot read network {}", path.display()))?;
    Network::from_json(&src)
        .into_diagnostic()
        .wrap_err_with(|| format!("invalid network {}", path.display()))
}

/// The question file, if any, with command-line overrides applied.
pub(crate) fn load_question(inputs: &Inputs) -> miette::Result<Question> {
    let mut question = match &inputs.question {
        Some(path) => {
            let src = fs::read_to_string(path)
                .into_diagnostic()
                .wrap_err_with(|| format!("cannot read question {}", path.display()))?;
            Question::from_json(&src)
                .into_diagnostic()
                .wrap_err_with(|| format!("invalid question {}", path.display()))?
        }
        None => Question::default(),
    };
    if let Some(failures) = inputs.failures {
        question.failures = failures;
    }
    if let Some(rule) = &inputs.tie_break {
        question.tie_break = rule.parse::<TieBreak>().into_diagnostic()?;
    }
    if let Some(env) = &inputs.env {
        question.base_env = env.parse::<EnvironmentType>().into_diagnostic()?;
    }
    question.full_model |= inputs.full_model;
    question.use_abstraction |= inputs.abstraction;
    Ok(question)
}

fn render<T: Serialize>(answer: &T) -> miette::Result<String> {
    serde_json::to_string_pretty(answer).into_diagnostic()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::path::PathBuf;

    fn inputs(args: &[&str]) -> Inputs {
        let mut argv = vec!["netverify", "reachability", "net.json"];
        argv.extend_from_slice(args);
        let cli = Cli::try_parse_from(argv).expect("parse");
        inputs_of(&cli.command).clone()
    }

    #[test]
    fn overrides_apply_on_top_of_defaults() {
        let q = load_question(&inputs(&[
            "--failures",
            "2",
            "--tie-break",
            "arbitrary",
            "--env",
            "sane",
            "--full-model",
        ]))
        .expect("question");
        assert_eq!(q.failures, 2);
        assert_eq!(q.tie_break, TieBreak::Arbitrary);
        assert_eq!(q.base_env, EnvironmentType::Sane);
        assert!(q.full_model);
        assert!(!q.use_abstraction);
        assert_eq!(q.dst_node_regex, ".*");
    }

    #[test]
    fn unknown_option_values_are_rejected() {
        assert!(load_question(&inputs(&["--tie-break", "coin-flip"])).is_err());
    }

    #[test]
    fn global_flags_parse_after_the_subcommand() {
        let cli = Cli::try_parse_from([
            "netverify",
            "local-consistency",
            "net.json",
            "--routers",
            "core.*",
            "--strict",
            "--workers",
            "4",
            "--dump-smt",
            "/tmp/q.smt2",
        ])
        .expect("parse");
        assert_eq!(cli.workers, 4);
        assert_eq!(cli.dump_smt, Some(PathBuf::from("/tmp/q.smt2")));
        match cli.command {
            Commands::LocalConsistency { routers, strict, inputs } => {
                assert_eq!(routers, "core.*");
                assert!(strict);
                assert_eq!(inputs.network, PathBuf::from("net.json"));
            }
            _ => panic!("wrong subcommand"),
        }
    }

    #[test]
    fn missing_network_file_is_reported() {
        let err = load_network(Path::new("/nonexistent/net.json")).expect_err("missing");
        assert!(err.to_string().starts_with("cannot read network"));
    }
}
