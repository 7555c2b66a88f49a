use anyhow::Context;
use embassy_executor::Spawner;
use embassy_futures::select::select;
use embassy_sync::channel::Channel;
use log::{error, info, warn};
use sencha_rs::display::ConsoleView;
use sencha_rs::hardware::BellCue;
use sencha_rs::system::{BrewEvent, EventBus, EventSubscriber, CONFIG_ENV_VAR};
use sencha_rs::{BrewController, BrewSession, Intent, IntentChannel, OutputFormat, SessionConfig};
use std::io::{BufRead, IsTerminal};

static INTENTS: IntentChannel = Channel::new();
static EVENTS: EventBus = EventBus::new();

#[embassy_executor::main]
async fn main(_spawner: Spawner) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("Starting sencha brew timer");

    let code = match run().await {
        Ok(()) => 0,
        Err(e) => {
            error!("{:#}", e);
            1
        }
    };

    // The executor never returns on its own
    std::process::exit(code);
}

async fn run() -> anyhow::Result<()> {
    let config = SessionConfig::from_env()
        .with_context(|| format!("failed to load session config from {}", CONFIG_ENV_VAR))?;

    // Subscribe before the session can publish anything
    let mut events = EVENTS
        .subscriber()
        .context("failed to subscribe to brew events")?;
    let mut renderer = Renderer {
        format: config.output,
        view: ConsoleView::new(config.leaf_grams, std::io::stdout().is_terminal()),
    };
    renderer.header();

    let cue = BellCue::new(std::io::stderr(), config.cue_duration()).with_sound(config.cue_sound.clone());
    let mut controller = BrewController::new(cue).with_leaf_grams(config.leaf_grams);
    controller.subscribe(EVENTS.publisher());

    spawn_input_reader()?;

    let mut session = BrewSession::new(controller, &config, &INTENTS);
    select(session.run(), render_events(&mut events, &mut renderer)).await;

    // Events published after the renderer last ran
    while let Some(event) = events.try_next_event() {
        renderer.render(&event);
    }
    Ok(())
}

// Blocking stdin lives on its own thread and feeds the session through the intent channel
fn spawn_input_reader() -> anyhow::Result<()> {
    std::thread::Builder::new()
        .name("stdin".into())
        .spawn(|| {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match line.parse::<Intent>() {
                    Ok(intent) => embassy_futures::block_on(INTENTS.send(intent)),
                    Err(e) => warn!("{}", e),
                }
            }
            embassy_futures::block_on(INTENTS.send(Intent::Shutdown));
        })?;
    Ok(())
}

struct Renderer {
    format: OutputFormat,
    view: ConsoleView,
}

impl Renderer {
    fn header(&self) {
        if self.format == OutputFormat::Text {
            for line in self.view.header() {
                println!("{}", line);
            }
        }
    }

    fn render(&mut self, event: &BrewEvent) {
        match self.format {
            OutputFormat::Text => {
                for line in self.view.apply(event) {
                    println!("{}", line);
                }
            }
            OutputFormat::Json => match serde_json::to_string(event) {
                Ok(line) => println!("{}", line),
                Err(e) => warn!("Failed to encode event: {}", e),
            },
        }
    }
}

async fn render_events(events: &mut EventSubscriber<'_>, renderer: &mut Renderer) {
    loop {
        let event = events.next_event().await;
        renderer.render(&event);
    }
}
