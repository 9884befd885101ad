// Copyright (C) 2024 Philipp Benner
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the “Software”), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in
// all copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED “AS IS”, WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
// SOFTWARE.

use std::process;
use std::str::FromStr;

use clap::{Arg, ArgMatches, Command};

use bbiquery::bbi::BbiFile;
use bbiquery::config::BbiParameters;
use bbiquery::feature::{Feature, FeatureData};
use bbiquery::genome::Genome;
use bbiquery::nearest::Direction;
use bbiquery::netfile::NetFile;

/* -------------------------------------------------------------------------- */

fn print_feature(genome: &Genome, feature: &Feature) {
    let chrom = genome.get_name(feature.chrom_id).unwrap_or("?");

    match &feature.data {
        FeatureData::Signal { score } => {
            println!("{}\t{}\t{}\t{}", chrom, feature.min, feature.max, score);
        }
        FeatureData::SummaryPoint { score, min_score, max_score } => {
            println!("{}\t{}\t{}\t{}\t{}\t{}", chrom, feature.min, feature.max, score, min_score, max_score);
        }
        FeatureData::Bed(bed) => {
            let mut line = format!("{}\t{}\t{}\t{}\t{}\t{}",
                chrom, feature.min, feature.max,
                bed.label.as_deref().unwrap_or("."),
                bed.score.map_or(".".to_string(), |s| s.to_string()),
                bed.orientation.unwrap_or('.'));
            if bed.kind != Default::default() {
                line.push_str(&format!("\t{}", bed.kind));
            }
            for (name, value) in &bed.extra_fields {
                line.push_str(&format!("\t{}={}", name, value));
            }
            println!("{}", line);
        }
    }
}

/* -------------------------------------------------------------------------- */

fn parse_arg<T: FromStr>(matches: &ArgMatches, name: &str) -> T {
    let value = matches.get_one::<String>(name).unwrap_or_else(|| {
        eprintln!("Argument `{}` is required", name);
        process::exit(1);
    });
    value.parse().unwrap_or_else(|_| {
        eprintln!("Invalid value `{}` for argument `{}`", value, name);
        process::exit(1);
    })
}

/* -------------------------------------------------------------------------- */

async fn run(matches: &ArgMatches, parameters: BbiParameters) -> bbiquery::Result<()> {

    let (command, sub) = match matches.subcommand() {
        Some(x) => x,
        None    => return Ok(()),
    };
    let filename_in: String = parse_arg(sub, "input");

    log::info!("Opening file {}", filename_in);

    let file = BbiFile::<NetFile>::open_path(&filename_in, parameters).await?;

    match command {
        "info" => {
            let info = file.info();
            if sub.get_flag("json") {
                let json_output = serde_json::to_string_pretty(&info).unwrap_or_else(|err| {
                    eprintln!("Error serializing to JSON: {}", err);
                    process::exit(1);
                });
                println!("{}", json_output);
            } else {
                print!("{}", info);
                if let Some(schema) = file.schema() {
                    print!("{}", schema);
                }
            }
        }
        "query" => {
            let chrom: String = parse_arg(sub, "chrom");
            let min  : u32    = parse_arg(sub, "min");
            let max  : u32    = parse_arg(sub, "max");

            let features = match sub.get_one::<String>("reduction") {
                Some(_) => file.read_wig_data_at_reduction(&chrom, min, max, parse_arg(sub, "reduction")).await?,
                None    => file.read_wig_data(&chrom, min, max).await?,
            };
            for feature in &features {
                print_feature(file.genome(), feature);
            }
        }
        "nearest" => {
            let chrom: String    = parse_arg(sub, "chrom");
            let pos  : u32       = parse_arg(sub, "pos");
            let dir  : Direction = parse_arg(sub, "dir");

            if let Some(feature) = file.get_first_adjacent(&chrom, pos, dir).await? {
                print_feature(file.genome(), &feature);
            }
        }
        "threshold" => {
            let chrom    : String    = parse_arg(sub, "chrom");
            let pos      : u32       = parse_arg(sub, "pos");
            let dir      : Direction = parse_arg(sub, "dir");
            let threshold: f64       = parse_arg(sub, "threshold");

            if let Some(feature) = file.threshold_search(&chrom, pos, dir, threshold).await? {
                print_feature(file.genome(), &feature);
            }
        }
        "lookup" => {
            let field: String = parse_arg(sub, "field");
            let value: String = parse_arg(sub, "value");

            for feature in &file.lookup(&field, &value).await? {
                print_feature(file.genome(), feature);
            }
        }
        _ => unreachable!(),
    }
    Ok(())
}

/* -------------------------------------------------------------------------- */

fn input_arg() -> Arg {
    Arg::new("input")
        .help("The input bigWig or bigBed file (local path or http(s) URL)")
        .required(true)
        .index(1)
}

fn main() {
    let matches = Command::new("BBI Query")
        .version("1.0")
        .author("Philipp Benner [https://github.com/pbenner]")
        .about("Query local or remote bigWig and bigBed files")
        .subcommand_required(true)
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .global(true)
                .action(clap::ArgAction::Count)
                .help("Be verbose (repeat for more output)"))
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .help("JSON file with reader parameters"))
        .subcommand(
            Command::new("info")
                .about("Print header information and chromosomes")
                .arg(input_arg())
                .arg(Arg::new("json")
                    .short('j')
                    .long("json")
                    .action(clap::ArgAction::SetTrue)
                    .help("Print output in json format")))
        .subcommand(
            Command::new("query")
                .about("Print records overlapping a region")
                .arg(input_arg())
                .arg(Arg::new("chrom").help("The chromosome to query").required(true).index(2))
                .arg(Arg::new("min").help("The start position (1-based)").required(true).index(3))
                .arg(Arg::new("max").help("The end position (inclusive)").required(true).index(4))
                .arg(Arg::new("reduction")
                    .short('r')
                    .long("reduction")
                    .help("Read the coarsest zoom level not exceeding this reduction")))
        .subcommand(
            Command::new("nearest")
                .about("Print the closest feature before or after a position")
                .arg(input_arg())
                .arg(Arg::new("chrom").help("The chromosome").required(true).index(2))
                .arg(Arg::new("pos").help("The reference position").required(true).index(3))
                .arg(Arg::new("dir").help("Search direction, +1 or -1").required(true).allow_hyphen_values(true).index(4)))
        .subcommand(
            Command::new("threshold")
                .about("Print the first record whose score exceeds a threshold")
                .arg(input_arg())
                .arg(Arg::new("chrom").help("The chromosome").required(true).index(2))
                .arg(Arg::new("pos").help("The reference position").required(true).index(3))
                .arg(Arg::new("dir").help("Search direction, +1 or -1").required(true).allow_hyphen_values(true).index(4))
                .arg(Arg::new("threshold").help("The score threshold").required(true).allow_hyphen_values(true).index(5)))
        .subcommand(
            Command::new("lookup")
                .about("Print bigBed records by the value of an indexed field")
                .arg(input_arg())
                .arg(Arg::new("field").help("The indexed field, e.g. name").required(true).index(2))
                .arg(Arg::new("value").help("The value to look up").required(true).index(3)))
        .get_matches();

    let log_level = match matches.get_count("verbose") {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let parameters = match matches.get_one::<String>("config") {
        Some(filename) => BbiParameters::import(filename).unwrap_or_else(|err| {
            eprintln!("Error reading config file: {}", err);
            process::exit(1);
        }),
        None => BbiParameters::default(),
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap_or_else(|err| {
            eprintln!("Error starting runtime: {}", err);
            process::exit(1);
        });

    if let Err(err) = runtime.block_on(run(&matches, parameters)) {
        eprintln!("Error: {}", err);
        process::exit(1);
    }
}
