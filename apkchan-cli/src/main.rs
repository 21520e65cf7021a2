// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    process::ExitCode
};

use apkchan_api::{generate, inspect, parse_extras, ChanError, GenerateOptions, Result};
use clap::{Parser, Subcommand};

/// Reads and writes distribution channel info in signed APKs without
/// touching their signatures.
///
/// ```
/// $ apkchan gen -c store,beta -e build=42 app.apk
/// $ apkchan show app-store.apk app-beta.apk
/// app-store.apk : channel=store
/// app-beta.apk : channel=beta
/// ```
#[derive(Parser, Debug)]
#[command(name = "apkchan", version, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the channel info of each APK
    #[command(after_help = "Examples:\n  \
      apkchan show /foo/bar/A.apk /foo/bar/bar/B.apk\n  \
      apkchan show -r /foo/bar/A.apk")]
    Show {
        /// Print the raw channel block instead of just the channel
        #[arg(short = 'r')]
        raw: bool,

        #[arg(value_name = "FILES", required = true)]
        files: Vec<PathBuf>
    },
    /// Generate one APK per channel
    #[command(after_help = "Examples:\n  \
      apkchan gen -c test /foo/bar/A.apk\n  \
      apkchan gen -o /foo/bar/channel/ -c test /foo/bar/A.apk\n  \
      apkchan gen -o /foo/bar/channel/ -c test1,test2 /foo/bar/A.apk")]
    Gen {
        /// Output directory, defaults to the input's directory
        #[arg(short = 'o', value_name = "DIR")]
        out: Option<PathBuf>,

        /// Channels to generate, comma separated
        #[arg(short = 'c', value_name = "CHANNELS", value_delimiter = ',', required = true)]
        channels: Vec<String>,

        /// Extra info as key value pairs, e.g. thing=test,boom=1
        #[arg(short = 'e', value_name = "EXTRAS", value_parser = parse_extras_arg)]
        extras: Option<BTreeMap<String, String>>,

        /// Overwrite existing channel APKs in the output directory
        #[arg(short = 'f')]
        force: bool,

        /// Log section offsets and timings
        #[arg(short = 'd')]
        debug: bool,

        #[arg(value_name = "FILE", required = true, num_args = 1..)]
        inputs: Vec<PathBuf>
    }
}

fn parse_extras_arg(extras: &str) -> std::result::Result<BTreeMap<String, String>, String> {
    Ok(parse_extras(extras)?)
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let debug = matches!(cli.command, Command::Gen { debug: true, .. });
    env_logger::Builder::new()
        .filter_level(if debug {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .parse_default_env()
        .init();

    let result = match cli.command {
        Command::Show { raw, files } => {
            show(&files, raw);
            Ok(())
        }
        Command::Gen {
            out,
            channels,
            extras,
            force,
            debug,
            inputs
        } => gen(out, channels, extras.unwrap_or_default(), inputs, force, debug)
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}

/// Each file is reported on its own line; one bad file doesn't stop the rest.
fn show(files: &[PathBuf], raw: bool) {
    for file in files {
        match inspect(file) {
            Ok(info) => {
                let info = info.unwrap_or_default();
                let text = if raw {
                    info.to_string()
                } else {
                    format!("channel={}", info.channel.unwrap_or_default())
                };
                println!("{} : {text}", file.display());
            }
            Err(ChanError::NotARegularFile(_)) => {
                println!("{} is not a regular file!", file.display())
            }
            Err(err) => println!("Error occurred on reading file {}, {err}", file.display())
        }
    }
}

fn gen(
    out: Option<PathBuf>,
    channels: Vec<String>,
    extras: BTreeMap<String, String>,
    inputs: Vec<PathBuf>,
    force: bool,
    debug: bool
) -> Result<()> {
    let input = inputs
        .first()
        .ok_or(ChanError::Cli("no input file".into()))?;
    if inputs.len() > 1 {
        log::warn!("Too many input files, only {} will be used", input.display());
    }

    let options = GenerateOptions {
        overwrite: force,
        debug
    };
    let outcomes = generate(out.as_deref(), &channels, &extras, input, &options)
        .map_err(|err| naming_input(input, err))?;

    let mut failed = 0;
    for outcome in &outcomes {
        match &outcome.result {
            Ok(()) => println!("Wrote {}", outcome.output.display()),
            Err(err) => {
                failed += 1;
                eprintln!(
                    "Error occurred on generating channel {}, {err}",
                    outcome.channel
                );
            }
        }
    }

    if failed > 0 {
        return Err(ChanError::Cli(format!(
            "{failed} of {} channels failed",
            outcomes.len()
        )));
    }
    println!("Done!");
    Ok(())
}

/// Attaches the input file to errors that don't already say which file they
/// are about.
fn naming_input(input: &Path, err: ChanError) -> ChanError {
    match err {
        ChanError::Cli(_)
        | ChanError::NotARegularFile(_)
        | ChanError::OutputNotADirectory(_)
        | ChanError::NoChannels => err,
        ChanError::ChannelAlreadyPresent(raw) => ChanError::Cli(format!(
            "file {} already carries a channel block {raw}",
            input.display()
        )),
        err => ChanError::Cli(format!(
            "Error occurred on parsing apk {}, {err}",
            input.display()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_failures_name_the_input() {
        let input = Path::new("/tmp/channels/plain.apk");
        let msg = naming_input(input, ChanError::NoSigningBlock).to_string();
        assert!(msg.contains("/tmp/channels/plain.apk"), "{msg}");
        assert!(msg.contains(&ChanError::NoSigningBlock.to_string()), "{msg}");

        let msg = naming_input(input, ChanError::EocdNotFound).to_string();
        assert!(msg.contains("/tmp/channels/plain.apk"), "{msg}");
    }

    #[test]
    fn existing_channel_names_the_input() {
        let input = Path::new("app-beta.apk");
        let msg = naming_input(
            input,
            ChanError::ChannelAlreadyPresent("{\"channel\":\"beta\"}".into())
        )
        .to_string();
        assert!(msg.contains("app-beta.apk"), "{msg}");
        assert!(msg.contains("{\"channel\":\"beta\"}"), "{msg}");
    }

    #[test]
    fn errors_that_carry_their_own_path_pass_through() {
        let dir = PathBuf::from("/tmp/not-a-dir");
        let err = naming_input(
            Path::new("app.apk"),
            ChanError::OutputNotADirectory(dir.clone())
        );
        assert!(matches!(err, ChanError::OutputNotADirectory(d) if d == dir));
    }

    #[test]
    fn gen_reports_unsigned_input_by_name() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("plain.apk");
        // An empty zip: a bare EOCD record with no signing block.
        let mut eocd = vec![0x50, 0x4b, 0x05, 0x06];
        eocd.extend([0u8; 18]);
        std::fs::write(&input, eocd).unwrap();

        let err = gen(
            None,
            vec!["beta".into()],
            BTreeMap::new(),
            vec![input.clone()],
            false,
            false
        )
        .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains(&input.display().to_string()), "{msg}");
        assert!(!dir.path().join("plain-beta.apk").exists());
    }
}
