use clap::Parser;
use std::{
    fs::File,
    num::{NonZeroU32, NonZeroUsize},
    time::Duration,
};

use crossterm::{
    event::{self, Event, KeyCode, KeyEvent},
    terminal::WindowSize,
};
use ratatui::{
    style::{Color, Style},
    widgets::{Bar, BarChart, BarGroup, Block, Gauge},
    Frame,
};
use tracing::{debug, error};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use wavemesh_audio::{
    cpal::{
        self,
        traits::{DeviceTrait, HostTrait},
        SampleFormat,
    },
    source::{CaptureError, FrameSource, MicSource},
    AnalysisConfig, AnalysisResult, Mode, OutputSlot, Pipeline, DEFAULT_BLOCK_SIZE,
    MAX_HUMAN_FREQUENCY, MIN_HUMAN_FREQUENCY,
};

const MAX_HEIGHT: u64 = 100;

#[derive(Parser, Debug)]
#[command(version, about)]
struct Ctx {
    /// The width of the bars in the spectrum view
    #[arg(short, long, default_value_t = 3)]
    bar_width: u16,

    /// The bar color.
    /// For a full list of possible colors: https://docs.rs/ratatui/latest/ratatui/style/enum.Color.html
    #[arg(short, long, default_value_t = Color::LightBlue)]
    color: Color,

    /// The amount of frequency bands in the spectrum view
    #[arg(short = 'n', long, default_value_t = 32)]
    num_bands: usize,

    /// Start in the amplitude view instead of the spectrum view
    #[arg(short, long)]
    amplitude: bool,

    /// Capture from the input device with the given name instead of the default one
    #[arg(short, long)]
    device: Option<String>,

    /// List the names of the available input devices and exit
    #[arg(long)]
    list_devices: bool,
}

struct App {
    ctx: Ctx,
    pipeline: Pipeline,
    output: OutputSlot,
    peak: f32,
}

impl App {
    fn draw(&mut self, frame: &mut Frame, window_size: WindowSize) {
        let title = format!(
            " wavemesh [{}] dropped: {} (q: quit, m: toggle view) ",
            match self.pipeline.mode() {
                Mode::Amplitude => "amplitude",
                Mode::Spectrum => "spectrum",
            },
            self.pipeline.dropped_frames(),
        );
        let block = Block::new().title(title);

        // Render whatever the slot holds. Right after a mode toggle this can
        // be a result of the previous mode for a frame or two.
        match self.output.read().as_deref() {
            Some(AnalysisResult::Spectrum { bands, .. }) => {
                self.peak *= 0.999;

                let bar_width = self.ctx.bar_width.clamp(1, 300);
                let amount_bars = usize::from(window_size.columns / (bar_width + 1)).max(1);

                let mut bars = Vec::with_capacity(amount_bars);
                for band in bands.iter().take(amount_bars) {
                    let value = band.iter().copied().fold(0f32, f32::max);
                    self.peak = self.peak.max(value);

                    let scaled = if self.peak > f32::EPSILON {
                        (value / self.peak * MAX_HEIGHT as f32) as u64
                    } else {
                        0
                    };
                    bars.push(Bar::default().text_value("".to_string()).value(scaled));
                }

                let chart = BarChart::default()
                    .block(block)
                    .data(BarGroup::default().label("".into()).bars(&bars))
                    .bar_width(bar_width)
                    .bar_gap(1)
                    .bar_style(Style::new().fg(self.ctx.color))
                    .max(MAX_HEIGHT);

                frame.render_widget(chart, frame.area());
            }
            Some(AnalysisResult::Amplitude { amplitude }) => {
                let gauge = Gauge::default()
                    .block(block)
                    .gauge_style(Style::new().fg(self.ctx.color))
                    .label(format!("rms {:.3}", amplitude))
                    .ratio(f64::from(amplitude.clamp(0., 1.)));

                frame.render_widget(gauge, frame.area());
            }
            None => frame.render_widget(block, frame.area()),
        }
    }

    fn handle_key(&mut self, code: KeyCode) -> bool {
        match code {
            KeyCode::Char('q') => return true,
            KeyCode::Char('m') => {
                let next = match self.pipeline.mode() {
                    Mode::Amplitude => Mode::Spectrum,
                    Mode::Spectrum => Mode::Amplitude,
                };
                self.pipeline.set_mode(next);
                self.peak = 0.;
                debug!("Switched to the {:?} view", next);
            }
            KeyCode::Char('+') => self.ctx.bar_width = (self.ctx.bar_width + 1).min(300),
            KeyCode::Char('-') => self.ctx.bar_width = self.ctx.bar_width.saturating_sub(1).max(1),
            _ => {}
        }

        false
    }
}

fn main() -> std::io::Result<()> {
    init_logger();

    let ctx = Ctx::parse();
    if ctx.list_devices {
        return list_devices();
    }

    let source = match acquire_source(&ctx) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("Couldn't open the capture source: {err}");
            std::process::exit(1);
        }
    };

    let sample_rate = source.sample_rate();
    let nyquist = sample_rate.0 / 2;
    let config = AnalysisConfig {
        sample_rate,
        num_bands: NonZeroUsize::new(ctx.num_bands.max(1)).unwrap(),
        freq_range: NonZeroU32::new(MIN_HUMAN_FREQUENCY).unwrap()
            ..NonZeroU32::new(MAX_HUMAN_FREQUENCY.min(nyquist)).unwrap(),
        ..Default::default()
    };

    let mut pipeline = Pipeline::new(config).expect("Create the analysis pipeline");
    let mode = if ctx.amplitude {
        Mode::Amplitude
    } else {
        Mode::Spectrum
    };
    pipeline.start(source, mode).expect("Start the capture");

    let output = pipeline.output();
    let mut app = App {
        ctx,
        pipeline,
        output,
        peak: 0.,
    };

    let mut terminal = ratatui::init();
    loop {
        let window_size = crossterm::terminal::window_size()?;
        terminal
            .draw(|frame| app.draw(frame, window_size))
            .expect("Render frame");

        if event::poll(Duration::from_millis(1000 / 60))? {
            if let Event::Key(KeyEvent { code, .. }) = event::read()? {
                if app.handle_key(code) {
                    break;
                }
            }
        }
    }
    ratatui::restore();

    app.pipeline.stop();
    Ok(())
}

fn acquire_source(ctx: &Ctx) -> Result<Box<MicSource>, CaptureError> {
    let error_callback = |err| error!("Capture stream error: {err}");

    let Some(device_name) = &ctx.device else {
        return MicSource::default_device(error_callback);
    };

    let device = cpal::default_host()
        .input_devices()
        .expect("Enumerate the input devices")
        .find(|device| matches!(device.name(), Ok(name) if name == *device_name))
        .unwrap_or_else(|| {
            eprintln!("There's no input device named \"{device_name}\".");
            eprintln!("The available devices are:");
            let _ = list_devices();
            std::process::exit(2);
        });

    let stream_config_range = device
        .supported_input_configs()?
        .filter(|entry| entry.sample_format() == SampleFormat::F32)
        .max_by(|a, b| a.cmp_default_heuristics(b))
        .ok_or(CaptureError::NoSupportedStreamConfig)?;

    MicSource::new(
        device,
        &stream_config_range,
        NonZeroUsize::new(DEFAULT_BLOCK_SIZE).unwrap(),
        error_callback,
    )
}

fn list_devices() -> std::io::Result<()> {
    let devices = cpal::default_host()
        .input_devices()
        .expect("Enumerate the input devices");

    for device in devices {
        println!(
            "{}",
            device.name().unwrap_or_else(|_| "<unknown>".to_string())
        );
    }

    Ok(())
}

fn init_logger() {
    let file = File::create("/tmp/wavemesh-cli.log").unwrap();

    let layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(file)
        .without_time();

    tracing_subscriber::registry()
        .with(layer)
        .with(EnvFilter::from_env(EnvFilter::DEFAULT_ENV))
        .init();
}
