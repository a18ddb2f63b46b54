use anyhow::Context;
use table_adsr::{EngineConfig, EnvelopeEngine, Phase};
use tracing::{info, Level};

const NOTE: u8 = 60;
const HOLD_SAMPLES: usize = 40;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::DEBUG).init();

    let cfg = match std::env::args().nth(1) {
        Some(path) => EngineConfig::load(&path).with_context(|| format!("loading {}", path))?,
        None => EngineConfig::from_yaml_str(include_str!("settings.yaml"))?,
    };
    let mut engine = EnvelopeEngine::new(cfg);
    info!(params = ?engine.parameters(), "envelope ready");

    engine.note_on(NOTE)?;
    let mut sample = 0usize;
    loop {
        if sample == HOLD_SAMPLES {
            engine.note_off(NOTE)?;
        }
        engine.tick();
        let gain = engine.get_multiplier(NOTE);
        let phase = engine.phase(NOTE)?;

        // draw the multiplier as a bar
        let width = 60;
        let amp = (gain * width as f32) as usize;
        let bar: String = (0..width)
            .map(|i| if i == amp { '+' } else if i < amp { '-' } else { ' ' })
            .collect();
        println!("{:4} {:<8} |{} {:.3}", sample, format!("{:?}", phase), bar, gain);

        sample += 1;
        if phase == Phase::Off && sample > HOLD_SAMPLES {
            break;
        }
    }
    Ok(())
}
