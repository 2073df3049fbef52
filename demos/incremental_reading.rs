use std::path::PathBuf;

use clap::{value_parser, Arg, Command};
use logcut::{CacheStore, PositionedReader};

// running this demo repeatedly prints lines appended to the file since the previous run
fn main() -> Result<(), anyhow::Error> {
    let app = Command::new("incremental_reading")
        .arg(
            Arg::new("FILE_PATH")
                .long("path")
                .short('p')
                .required(true)
                .value_parser(value_parser!(PathBuf))
                .help("path to file that is appended to"),
        )
        .arg(
            Arg::new("CACHE_FILE")
                .long("cache")
                .short('c')
                .required(true)
                .value_parser(value_parser!(PathBuf))
                .help("path to file that is used to keep positions between runs"),
        );

    let args = app.get_matches();
    let path = args.get_one::<PathBuf>("FILE_PATH").unwrap();
    let cache = CacheStore::new(args.get_one::<PathBuf>("CACHE_FILE").unwrap());

    let mut reader = PositionedReader::new(path, Default::default())?;
    let cached = cache.lookup(reader.path())?;
    reader.set_position(cached.clone());

    let mut session = reader.open()?;
    for line in session.by_ref() {
        let line = line?;
        println!("read line: `{}`", String::from_utf8_lossy(&line).trim_end());
    }
    session.close();

    if reader.position() == &cached {
        println!("nothing new");
    } else {
        cache.save(reader.path(), reader.position())?;
    }

    Ok(())
}
