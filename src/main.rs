// src/main.rs

use xwax::device::cpal_device::CpalDevice;
use xwax::{Deck, Realtime};

fn main() -> Result<(), anyhow::Error> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        anyhow::bail!("usage: {} <timecode-def-name> <importer-path>", args[0]);
    }
    let timecode_def_name = &args[1];
    let importer_path = &args[2];

    let device = CpalDevice::open()?;

    let mut realtime = Realtime::new();
    let deck = Deck::new(
        &mut realtime,
        Box::new(device),
        timecode_def_name,
        importer_path,
        false,
    )?;
    realtime.launch()?;

    println!("Running. Press Ctrl-C to quit.");

    loop {
        std::thread::sleep(std::time::Duration::from_millis(200));
        if let Some((position, _when)) = deck.timecoder.lock().get_position() {
            println!("position: {position}");
        }
    }
}
