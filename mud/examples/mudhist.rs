// Copyright 2024 Peter Williams and collaborators
// Licensed under the MIT License.

//! Dump histogram bin counts from a MUD file as text columns.
//!
//! With a key (a histogram number or title), one histogram is printed along
//! with the time of each bin relative to t0. Without one, every histogram is
//! printed side by side.

use anyhow::{anyhow, Context, Error};
use clap::{Arg, Command};
use rubbl_core::notify::ClapNotificationArgsExt;
use rubbl_core::rn_note;
use rubbl_mud::{HistKey, MudFile};
use std::ffi::OsString;
use std::process;

fn main() {
    let matches = Command::new("mudhist")
        .version("0.1.0")
        .about("Dump histogram bin counts from a MUD file.")
        .rubbl_notify_args()
        .arg(
            Arg::new("PATH")
                .help("The path to the MUD file")
                .value_parser(clap::value_parser!(OsString))
                .required(true)
                .index(1),
        )
        .arg(
            Arg::new("KEY")
                .help("The number or title of the histogram to dump")
                .index(2),
        )
        .get_matches();

    process::exit(rubbl_core::notify::run_with_notifications(
        matches,
        |matches, nbe| -> Result<i32, Error> {
            let path = matches.get_one::<OsString>("PATH").unwrap();

            let key = match matches.get_one::<String>("KEY") {
                Some(text) => Some(text.parse::<HistKey>()?),
                None => None,
            };

            let mut mf = MudFile::open(path)
                .with_context(|| format!("failed to open \"{}\"", path.to_string_lossy()))?;

            let hists = mf
                .get_histograms()?
                .ok_or_else(|| anyhow!("\"{}\" contains no histograms", path.to_string_lossy()))?;

            mf.drain_notifications(&mut *nbe);

            match key {
                Some(key) => {
                    let h = hists.get(key)?;
                    rn_note!(
                        nbe,
                        "histogram {} ({}): {} bins",
                        h.num,
                        h.title.as_deref().unwrap_or("untitled"),
                        h.data.len()
                    );

                    let t0 = h.t0_bin.map(|b| b as f64);

                    for (i, count) in h.data.iter().enumerate() {
                        match (t0, hists.seconds_per_bin) {
                            (Some(t0), Some(dt)) => {
                                println!("{}\t{:.6e}\t{}", i, (i as f64 - t0) * dt, count)
                            }
                            _ => println!("{i}\t{count}"),
                        }
                    }
                }

                None => {
                    let matrix = hists.data_matrix()?;
                    rn_note!(
                        nbe,
                        "{} histograms of {} bins",
                        matrix.nrows(),
                        matrix.ncols()
                    );

                    let titles: Vec<String> = hists
                        .iter()
                        .map(|h| h.title.clone().unwrap_or_else(|| format!("h{}", h.num)))
                        .collect();
                    println!("bin\t{}", titles.join("\t"));

                    for (i, column) in matrix.columns().into_iter().enumerate() {
                        let counts: Vec<String> = column.iter().map(|c| c.to_string()).collect();
                        println!("{}\t{}", i, counts.join("\t"));
                    }
                }
            }

            Ok(0)
        },
    ));
}
