use logcut::{EofScanner, PositionedReader};

// remembers where the file ends right now and waits for a line to be appended
fn main() -> Result<(), anyhow::Error> {
    let path = std::env::args().nth(1).unwrap_or("demos/file.txt".to_string());

    let end = EofScanner::default().scan_path(&path)?;
    println!(
        "file ends with `{}` at offset {}",
        String::from_utf8_lossy(&end.last_line).trim_end(),
        end.offset
    );
    let mut reader = PositionedReader::new(&path, end)?;

    println!("append a line to {path} and press enter");
    std::io::stdin().read_line(&mut String::new())?;

    let new_lines = reader.open()?.collect::<Result<Vec<_>, _>>()?;
    if new_lines.is_empty() {
        println!("nothing was appended");
    }
    for line in new_lines {
        println!("appended: `{}`", String::from_utf8_lossy(&line).trim_end());
    }

    Ok(())
}
