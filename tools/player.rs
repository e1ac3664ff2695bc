/// Player: plays a flow script in the terminal.
///
/// Usage: player [--flows <flow.ron>] [--config <engine.ron>] [--seed <n>]
///
/// Keys:
///   enter / space / →   advance, or skip while text is revealing
///   backspace / ←       back
///   1-9                 jump to the nth flow
///   s                   skip
///   m                   mute / unmute cues
///   q / esc             quit
///
/// Cues are not audible here; they are logged at `info` level to stderr
/// (set `RUST_LOG=info` and redirect stderr to a file to see them).

use std::io::{self, Stdout, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use crossterm::event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::{cursor, execute, queue, style, terminal};
use futures::StreamExt;
use tokio::time::MissedTickBehavior;
use tracing_subscriber::EnvFilter;

use narrative_flow::core::audio::AudioOutput;
use narrative_flow::core::config::{EngineConfig, RedirectConfig};
use narrative_flow::core::graph::FlowGraph;
use narrative_flow::core::presenter::{Affordances, Presenter};
use narrative_flow::core::session::Session;
use narrative_flow::schema::cue::Voice;

const MARGIN: u16 = 2;

/// Draws the revealed text and the affordance bar with crossterm.
struct TerminalPresenter {
    out: Stdout,
    error: Option<io::Error>,
    pending_redirect: Option<(String, Instant)>,
}

impl TerminalPresenter {
    fn new() -> Self {
        Self {
            out: io::stdout(),
            error: None,
            pending_redirect: None,
        }
    }

    fn record(&mut self, result: io::Result<()>) {
        if let Err(e) = result {
            self.error.get_or_insert(e);
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        if let Some(e) = self.error.take() {
            return Err(e);
        }
        self.out.flush()
    }

    /// The redirect URL, once its delay has elapsed.
    fn take_due_redirect(&mut self) -> Option<String> {
        let due = matches!(&self.pending_redirect, Some((_, due)) if Instant::now() >= *due);
        if due {
            self.pending_redirect.take().map(|(url, _)| url)
        } else {
            None
        }
    }

    fn draw_bar(&mut self, text: &str) {
        let rows = terminal::size().map(|(_, rows)| rows).unwrap_or(24);
        let result = queue!(
            self.out,
            cursor::SavePosition,
            cursor::MoveTo(MARGIN, rows.saturating_sub(1)),
            terminal::Clear(terminal::ClearType::CurrentLine),
            style::Print(text),
            cursor::RestorePosition
        );
        self.record(result);
    }
}

impl Presenter for TerminalPresenter {
    fn clear_text(&mut self) {
        let result = queue!(
            self.out,
            terminal::Clear(terminal::ClearType::All),
            cursor::MoveTo(MARGIN, 1)
        );
        self.record(result);
    }

    fn append_text(&mut self, text: &str) {
        for (i, line) in text.split('\n').enumerate() {
            if i > 0 {
                let result = queue!(self.out, style::Print("\r\n"), cursor::MoveToColumn(MARGIN));
                self.record(result);
            }
            if !line.is_empty() {
                let result = queue!(self.out, style::Print(line));
                self.record(result);
            }
        }
    }

    fn show_affordances(&mut self, affordances: &Affordances) {
        let mut bar = String::new();
        if affordances.back {
            bar.push_str("[← BACK]   ");
        }
        if let Some(label) = &affordances.advance {
            bar.push_str(&format!("[{label}]"));
        }
        self.draw_bar(&bar);
    }

    fn redirect(&mut self, target: &RedirectConfig) {
        self.pending_redirect = Some((target.url.clone(), Instant::now() + target.delay()));
    }
}

/// Logs each voice instead of playing it.
struct LogOutput;

impl AudioOutput for LogOutput {
    type Sample = ();

    fn start(&mut self, _sample: &(), voice: Voice) {
        tracing::info!(
            sample = %voice.sample,
            rate = voice.playback_rate,
            gain = voice.gain * voice.bus_gain,
            path = ?voice.path,
            "cue"
        );
    }

    fn resume(&mut self) {
        tracing::info!("background audio started");
    }

    fn set_background_volume(&mut self, volume: f32) {
        tracing::info!(volume, "background volume");
    }
}

type TerminalSession = Session<TerminalPresenter, LogOutput>;

struct Args {
    flows: PathBuf,
    config: Option<PathBuf>,
    seed: Option<u64>,
}

fn parse_args() -> Option<Args> {
    let args: Vec<String> = std::env::args().collect();
    let mut parsed = Args {
        flows: PathBuf::from("content/landing.ron"),
        config: None,
        seed: None,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--flows" if i + 1 < args.len() => {
                i += 1;
                parsed.flows = PathBuf::from(&args[i]);
            }
            "--config" if i + 1 < args.len() => {
                i += 1;
                parsed.config = Some(PathBuf::from(&args[i]));
            }
            "--seed" if i + 1 < args.len() => {
                i += 1;
                parsed.seed = args[i].parse().ok();
            }
            _ => return None,
        }
        i += 1;
    }
    Some(parsed)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    let Some(args) = parse_args() else {
        eprintln!("Usage: player [--flows <flow.ron>] [--config <engine.ron>] [--seed <n>]");
        std::process::exit(1);
    };

    let graph = FlowGraph::load_from_ron(&args.flows)
        .with_context(|| format!("loading flows from {}", args.flows.display()))?;
    let mut config = match &args.config {
        Some(path) => EngineConfig::load_from_ron(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if args.seed.is_some() {
        config.seed = args.seed;
    }

    terminal::enable_raw_mode()?;
    execute!(io::stdout(), terminal::EnterAlternateScreen, cursor::Hide)?;

    let result = run(Arc::new(graph), config).await;

    terminal::disable_raw_mode()?;
    execute!(io::stdout(), cursor::Show, terminal::LeaveAlternateScreen)?;

    if let Ok(Some(url)) = &result {
        println!("Continue at {url}");
    }
    result.map(|_| ())
}

/// Run until the user quits or a redirect comes due. Returns the
/// redirect URL when the session ended in one.
async fn run(graph: Arc<FlowGraph>, config: EngineConfig) -> anyhow::Result<Option<String>> {
    let samples: Vec<String> = config.samples.iter().map(|s| s.name.clone()).collect();
    let flows: Vec<String> = graph.flow_names().map(String::from).collect();

    let mut session = Session::start(graph, config, TerminalPresenter::new(), LogOutput)?;
    for name in samples {
        session.cues_mut().register_sample(name, ());
    }

    let mut ticks = tokio::time::interval(session.tick_interval());
    ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut events = EventStream::new();

    loop {
        tokio::select! {
            biased;

            maybe_event = events.next() => {
                match maybe_event {
                    Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => {
                        if !handle_key(&mut session, key, &flows)? {
                            return Ok(None);
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e.into()),
                    None => return Ok(None),
                }
            }

            _ = ticks.tick() => {
                session.tick();
            }
        }

        session.presenter_mut().flush()?;

        if let Some(url) = session.presenter_mut().take_due_redirect() {
            return Ok(Some(url));
        }
    }
}

/// Apply one key press. Returns `false` when the user asked to quit.
fn handle_key(
    session: &mut TerminalSession,
    key: KeyEvent,
    flows: &[String],
) -> anyhow::Result<bool> {
    match key.code {
        KeyCode::Esc | KeyCode::Char('q') => return Ok(false),
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => return Ok(false),

        KeyCode::Enter | KeyCode::Char(' ') | KeyCode::Right => {
            if session.is_busy() {
                session.request_skip();
            } else {
                session.advance()?;
            }
        }
        KeyCode::Backspace | KeyCode::Left => {
            session.go_back()?;
        }
        KeyCode::Char('s') => {
            session.request_skip();
        }
        KeyCode::Char('m') => {
            let muted = session.cues().is_muted();
            session.cues_mut().set_muted(!muted);
        }
        KeyCode::Char(c) if c.is_ascii_digit() && c != '0' => {
            let index = c as usize - '1' as usize;
            if let Some(flow) = flows.get(index) {
                session.jump_to(flow)?;
            }
        }
        _ => {}
    }
    Ok(true)
}
