// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # c2-import
//!
//! Command-line interface for the Caffe2 importer.
//!
//! ## Usage
//! ```bash
//! # Lower a model and print the resulting graph
//! c2-import inspect --predict-net predict_net.pb --init-net init_net.pb --input data=1x3x224x224
//!
//! # Import and execute a model described by a TOML file
//! c2-import run --config run.toml
//! ```

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "c2-import",
    about = "Import Caffe2 models into a typed graph IR and run them",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging (repeat for more: -v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lower a model and print its graph.
    Inspect {
        /// Predict net (`.json` for JSON, anything else for protobuf).
        #[arg(short, long)]
        predict_net: PathBuf,

        /// Init net holding the weight fills.
        #[arg(short, long)]
        init_net: PathBuf,

        /// External input as `name=d0xd1x...[:dtype]` (repeatable).
        #[arg(long = "input", value_parser = commands::inspect::parse_input)]
        inputs: Vec<commands::inspect::InputArg>,

        /// Print every node, not only the summary.
        #[arg(long)]
        nodes: bool,
    },

    /// Import and execute a model described by a TOML configuration.
    Run {
        /// Path to the TOML run configuration.
        #[arg(short, long)]
        config: PathBuf,

        /// Print the full metrics as JSON.
        #[arg(long)]
        metrics_json: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    commands::init_tracing(cli.verbose);

    match cli.command {
        Commands::Inspect {
            predict_net,
            init_net,
            inputs,
            nodes,
        } => commands::inspect::execute(predict_net, init_net, inputs, nodes),
        Commands::Run {
            config,
            metrics_json,
        } => commands::run::execute(config, metrics_json),
    }
}
