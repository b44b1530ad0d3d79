use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use beatgrid::pipeline::persistence;
use beatgrid::{AudioCommand, PlaybackCoordinator, start_audio};

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn usage() -> ! {
    eprintln!(
        "usage: beatgrid <project-dir> <command>\n\
         \n\
         commands:\n\
         \x20 export <out.wav>   render one loop pass to a WAV file\n\
         \x20 play [seconds]     play the loop live (default 8)"
    );
    std::process::exit(2);
}

fn run() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let Some(project_dir) = args.next().map(PathBuf::from) else {
        usage();
    };

    let state = persistence::load_state(&project_dir).unwrap_or_default();

    match args.next().as_deref() {
        Some("export") => {
            let Some(out) = args.next().map(PathBuf::from) else {
                usage();
            };
            beatgrid::export::export_project(&state.project, &out)?;
            println!("exported {} bars to {}", state.project.num_bars, out.display());
        }
        Some("play") => {
            let seconds: u64 = args
                .next()
                .and_then(|s| s.parse().ok())
                .unwrap_or(8);

            let audio = start_audio()?;
            let project = Arc::new(RwLock::new(state.project.clone()));
            let mut coordinator =
                PlaybackCoordinator::new(project, Arc::new(audio.clock()), audio.sink());

            coordinator.toggle_playback();
            std::thread::sleep(Duration::from_secs(seconds));
            coordinator.toggle_playback();
            audio.send(AudioCommand::AllOff);

            // keep whatever was on disk, including the onboarding flag
            persistence::save_state(&project_dir, &state)?;
        }
        _ => usage(),
    }

    Ok(())
}
