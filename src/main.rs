//! Application entry point: guide-voice command line.
//!
//! # Startup sequence
//!
//! 1. Parse the command line.
//! 2. Initialise logging (`-v` raises the default filter; `RUST_LOG` wins).
//! 3. Load [`AppConfig`] (defaults on first run).
//! 4. Run the chosen subcommand on the tokio runtime.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};

use guide_voice::assistant::Assistant;
use guide_voice::audio::AudioCapture;
use guide_voice::config::{AppConfig, AppPaths, Language};
use guide_voice::gemini::GeminiClient;
use guide_voice::live::{GeminiLiveConnector, LiveController, LiveError};
use guide_voice::playback::{play_clip, OutputDevice};

/// Travel guide with live voice, translation and place discovery
#[derive(Parser)]
#[command(name = "guide-voice", version, about)]
struct Cli {
    /// Settings file (defaults to the platform config directory)
    #[arg(long, env = "GUIDE_VOICE_CONFIG")]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Talk with the guide in real time (premium)
    Live,
    /// Translate text and read the translation aloud
    Translate {
        text: String,
        /// Source language (code or name)
        #[arg(short, long, default_value = "uz")]
        from: String,
        /// Target language (code or name)
        #[arg(short, long, default_value = "en")]
        to: String,
        /// Print only, do not play audio
        #[arg(long)]
        silent: bool,
    },
    /// Read text aloud
    Speak { text: String },
    /// Find famous landmarks for a place
    Discover {
        query: String,
        /// Answer language (defaults to the preferred language)
        #[arg(short, long)]
        lang: Option<String>,
    },
    /// Ask the travel guide a question
    Ask {
        message: String,
        /// Answer language (defaults to the preferred language)
        #[arg(short, long)]
        lang: Option<String>,
        /// Print only, do not play audio
        #[arg(long)]
        silent: bool,
    },
    /// Show or change settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective settings
    Show,
    /// Print the settings file path
    Path,
    /// Set the preferred language (code or name)
    Language { lang: String },
    /// Turn the premium entitlement on or off
    Premium {
        #[arg(action = clap::ArgAction::Set)]
        enabled: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let settings_file = cli
        .config
        .clone()
        .unwrap_or_else(|| AppPaths::new().settings_file);

    let config = AppConfig::load_from(&settings_file).unwrap_or_else(|e| {
        log::warn!("Failed to load config ({e:#}); using defaults");
        AppConfig::default()
    });

    match cli.command {
        Command::Live => run_live(&config).await,
        Command::Translate {
            text,
            from,
            to,
            silent,
        } => run_translate(&config, &text, &from, &to, silent).await,
        Command::Speak { text } => run_speak(&config, &text).await,
        Command::Discover { query, lang } => {
            let lang = language_name(lang.as_deref(), &config)?;
            run_discover(&config, &query, &lang).await
        }
        Command::Ask {
            message,
            lang,
            silent,
        } => {
            let lang = language_name(lang.as_deref(), &config)?;
            run_ask(&config, &message, &lang, silent).await
        }
        Command::Config { action } => run_config(config, &settings_file, action),
    }
}

/// Resolve a language code or name to its display name; `None` means the
/// preferred language.
fn language_name(key: Option<&str>, config: &AppConfig) -> anyhow::Result<String> {
    let key = key.unwrap_or(&config.settings.preferred_language);
    match Language::find(key) {
        Some(lang) => Ok(lang.name.to_string()),
        None => bail!("unknown language {key:?}"),
    }
}

fn assistant(config: &AppConfig) -> anyhow::Result<Assistant> {
    let client = GeminiClient::from_config(&config.gemini)?;
    Ok(Assistant::new(Arc::new(client), config.gemini.clone()))
}

// ---------------------------------------------------------------------------
// live
// ---------------------------------------------------------------------------

async fn run_live(config: &AppConfig) -> anyhow::Result<()> {
    let connector = GeminiLiveConnector::from_config(&config.live, &config.gemini)?;
    let speaker = OutputDevice::open(config.audio.output_sample_rate)
        .context("failed to open the speaker")?;

    let live = LiveController::new(
        Arc::new(connector),
        Arc::new(AudioCapture::default()),
        Arc::new(speaker.mixer()),
        config,
    );

    match live.start(config.settings.is_premium).await {
        Ok(()) => {}
        Err(LiveError::NotEntitled) => {
            bail!("live voice needs premium; enable it with `guide-voice config premium true`")
        }
        Err(e) => return Err(e.into()),
    }

    println!("Listening. Press Ctrl-C to hang up.");

    let mut ticker = tokio::time::interval(Duration::from_millis(200));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                log::info!("live: hanging up");
                live.stop().await;
                break;
            }
            _ = ticker.tick() => {
                if live.state().is_terminal() {
                    break;
                }
            }
        }
    }

    let state = live.state();
    wait_until_idle(&speaker, Duration::from_secs(5)).await;
    println!("Session {state}.");
    Ok(())
}

// ---------------------------------------------------------------------------
// one-shot features
// ---------------------------------------------------------------------------

async fn run_translate(
    config: &AppConfig,
    text: &str,
    from: &str,
    to: &str,
    silent: bool,
) -> anyhow::Result<()> {
    let from = language_name(Some(from), config)?;
    let to = language_name(Some(to), config)?;
    let assistant = assistant(config)?;

    if silent {
        println!("{}", assistant.translate(text, &from, &to).await?);
        return Ok(());
    }

    let translation = assistant.translate_and_speak(text, &from, &to).await?;
    println!("{}", translation.translated_text);
    if let Some(audio) = &translation.audio {
        play(config, audio).await?;
    }
    Ok(())
}

async fn run_speak(config: &AppConfig, text: &str) -> anyhow::Result<()> {
    let audio = assistant(config)?.synthesize(text).await?;
    play(config, &audio).await
}

async fn run_discover(config: &AppConfig, query: &str, lang: &str) -> anyhow::Result<()> {
    let discovery = assistant(config)?.discover_places(query, lang).await?;

    if discovery.places.is_empty() {
        println!("No places found for {query:?}.");
    }
    for place in &discovery.places {
        let rating = place
            .rating
            .map(|r| format!(" ({r:.1})"))
            .unwrap_or_default();
        println!("{}{rating}, {}", place.name, place.location);
        println!("  {}", place.description);
        println!("  map:   {}", place.map_link);
        println!("  image: {}", place.image_url);
    }
    if !discovery.related_queries.is_empty() {
        println!();
        for q in &discovery.related_queries {
            println!("? {q}");
        }
    }
    Ok(())
}

async fn run_ask(config: &AppConfig, message: &str, lang: &str, silent: bool) -> anyhow::Result<()> {
    let assistant = assistant(config)?;
    let reply = assistant.ask_guide(message, lang).await?;
    println!("{}", reply.render());

    if !silent && reply.should_speak() {
        if let Some(audio) = assistant.speak_text(&reply.text).await {
            play(config, &audio).await?;
        }
    }
    Ok(())
}

/// Play one base64 clip and wait for it to finish.
async fn play(config: &AppConfig, audio: &str) -> anyhow::Result<()> {
    let speaker = OutputDevice::open(config.audio.output_sample_rate)
        .context("failed to open the speaker")?;
    let clip = play_clip(&speaker.mixer(), audio, config.audio.output_sample_rate)?;

    let limit = Duration::from_secs_f64(clip.duration) + Duration::from_secs(1);
    wait_until_idle(&speaker, limit).await;
    Ok(())
}

async fn wait_until_idle(speaker: &OutputDevice, limit: Duration) {
    let mixer = speaker.mixer();
    let deadline = tokio::time::Instant::now() + limit;
    while !mixer.is_idle() && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

fn run_config(
    config: AppConfig,
    settings_file: &std::path::Path,
    action: ConfigAction,
) -> anyhow::Result<()> {
    match action {
        ConfigAction::Show => {
            let mut shown = config;
            if shown.gemini.api_key.is_some() {
                shown.gemini.api_key = Some("<redacted>".into());
            }
            print!("{}", toml::to_string_pretty(&shown)?);
        }
        ConfigAction::Path => println!("{}", settings_file.display()),
        // Writes reload the file strictly so a broken one is reported
        // instead of being replaced by defaults.
        ConfigAction::Language { lang } => {
            let Some(lang) = Language::find(&lang) else {
                bail!("unknown language {lang:?}");
            };
            AppConfig::update_file(settings_file, |c| {
                c.settings.preferred_language = lang.name.to_string();
            })?;
            println!("Preferred language: {}", lang.name);
        }
        ConfigAction::Premium { enabled } => {
            AppConfig::update_file(settings_file, |c| c.settings.is_premium = enabled)?;
            println!("Premium: {enabled}");
        }
    }
    Ok(())
}
