// Copyright 2024 Peter Williams and collaborators
// Licensed under the MIT License.

//! Summarize the contents of a MUD file.

use anyhow::{Context, Error};
use clap::{Arg, ArgAction, Command};
use rubbl_core::notify::ClapNotificationArgsExt;
use rubbl_mud::{Family, MudFile};
use std::ffi::OsString;
use std::fmt::Display;
use std::process;

fn show<T: Display>(v: &Option<T>) -> String {
    match v {
        Some(x) => x.to_string(),
        None => "-".to_owned(),
    }
}

fn main() {
    let matches = Command::new("mudsummary")
        .version("0.1.0")
        .about("Summarize the contents of a MUD file.")
        .rubbl_notify_args()
        .arg(
            Arg::new("comments")
                .long("comments")
                .help("Print the text of each comment")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("PATH")
                .help("The path to the MUD file")
                .value_parser(clap::value_parser!(OsString))
                .required(true)
                .index(1),
        )
        .get_matches();

    process::exit(rubbl_core::notify::run_with_notifications(
        matches,
        |matches, nbe| -> Result<i32, Error> {
            let path = matches.get_one::<OsString>("PATH").unwrap();
            let show_bodies = matches.get_flag("comments");

            let mut mf = MudFile::open(path)
                .with_context(|| format!("failed to open \"{}\"", path.to_string_lossy()))?;

            println!("File: {}", path.to_string_lossy());
            println!("Format: {}", mf.container_kind()?);

            if let Some(rd) = mf.get_run_description()? {
                println!();
                println!("Experiment: {}", show(&rd.experiment_number));
                println!("Run: {}", show(&rd.run_number));
                println!("Title: {}", show(&rd.title));
                println!("Subtitle: {}", show(&rd.subtitle));
                println!("Sample: {}", show(&rd.sample));
                println!("Orientation: {}", show(&rd.orientation));
                println!("Temperature: {}", show(&rd.temperature));
                println!("Field: {}", show(&rd.field));
                println!("Apparatus: {}", show(&rd.apparatus));
                println!("Experimenters: {}", show(&rd.experimenters));
                println!(
                    "Time: {} to {} ({} s elapsed)",
                    show(&rd.time_begin),
                    show(&rd.time_end),
                    show(&rd.elapsed_seconds)
                );

                for (i, c) in rd.header_comments.iter().enumerate() {
                    if let Some(c) = c {
                        println!("Comment {}: {}", i + 1, c);
                    }
                }
            }

            println!();

            for fam in Family::ALL.iter() {
                let info = mf.family_info(*fam)?;

                match info.kind {
                    Some(k) => println!("{:>20}s: {:4}  (group {:#010x})", fam, info.count, k),
                    None => println!("{:>20}s: none", fam),
                }
            }

            let comments = mf.get_comments()?;

            if !comments.is_empty() {
                println!();
                println!("Comments:");

                for c in &comments {
                    println!(
                        "  {:3}  {}  {}  (prev {}, next {})",
                        c.number,
                        show(&c.author),
                        show(&c.title),
                        show(&c.prev),
                        show(&c.next)
                    );

                    if show_bodies {
                        if let Some(ref body) = c.body {
                            for line in body.lines() {
                                println!("         {line}");
                            }
                        }
                    }
                }
            }

            let scalers = mf.get_scalers()?;

            if !scalers.is_empty() {
                println!();
                println!("Scalers:");

                for (i, s) in scalers.iter().enumerate() {
                    println!("  {:3}  {:<12}  {}", i + 1, show(&s.label), show(&s.count));
                }
            }

            let vars = mf.get_independent_variables()?;

            if !vars.is_empty() {
                println!();
                println!("Independent variables:");

                for (i, v) in vars.iter().enumerate() {
                    let history = match v.historical_data {
                        Some(ref h) => format!("{} samples", h.len()),
                        None => "no history".to_owned(),
                    };

                    println!(
                        "  {:3}  {:<20}  {} +/- {} {}  [{}]",
                        i + 1,
                        show(&v.name),
                        show(&v.mean),
                        show(&v.std_dev),
                        v.units.as_deref().unwrap_or(""),
                        history
                    );
                }
            }

            if let Some(hists) = mf.get_histograms()? {
                println!();
                println!(
                    "Histograms: {} bins of {} bytes, {} s per bin",
                    hists.n_bins,
                    hists.bytes_per_bin,
                    show(&hists.seconds_per_bin)
                );

                for h in &hists {
                    let good = match h.good_bins {
                        Some((a, b)) => format!("{a}-{b}"),
                        None => "-".to_owned(),
                    };

                    println!(
                        "  {:3}  {:<10}  t0 bin {:>6}  good {:>12}  {:>10} events",
                        h.num,
                        show(&h.title),
                        show(&h.t0_bin),
                        good,
                        show(&h.n_events)
                    );
                }
            }

            mf.drain_notifications(nbe);
            Ok(0)
        },
    ));
}
