use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::device::{LcdClient, LcdDevice};
use super::protocol::{BACKLIGHT_ON, LcdCommand};
use super::render::{RenderState, window, wrap_lines};
use crate::actor::{CommandRegistry, CommandResult, Mailbox, arg, dispatch, respond};
use crate::error::CommandError;
use crate::model::{Display, Rgb};

#[derive(Debug, Clone)]
pub struct DriverConfig {
    pub width: u8,
    pub height: u8,
    pub tick: Duration,
    pub blink_interval: Duration,
    pub text_cycle_interval: Duration,
    /// Reported by `get_brightness` until something is set.
    pub brightness: u8,
    pub contrast: u8,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            width: 16,
            height: 2,
            tick: Duration::from_millis(100),
            blink_interval: Duration::from_millis(250),
            text_cycle_interval: Duration::from_secs(2),
            brightness: 255,
            contrast: 200,
        }
    }
}

/// Owns the panel. Turns each resolved [`Display`] into the fewest panel
/// commands that get it on screen, and runs the blink and text-cycle timers.
pub struct LcdDriver {
    client: LcdClient,
    state: RenderState,
    brightness: u8,
    contrast: u8,
    commands: CommandRegistry<LcdDriver>,
    config: DriverConfig,
}

impl LcdDriver {
    pub fn new(
        config: DriverConfig,
        device: Box<dyn LcdDevice>,
        commands: CommandRegistry<LcdDriver>,
    ) -> Self {
        Self {
            client: LcdClient::new(device),
            state: RenderState::default(),
            brightness: config.brightness,
            contrast: config.contrast,
            commands,
            config,
        }
    }

    pub fn commands() -> CommandRegistry<LcdDriver> {
        CommandRegistry::new()
            .with("message", LcdDriver::handle_message)
            .with("set_message", LcdDriver::handle_set_message)
            .with("set_blink", LcdDriver::handle_set_blink)
            .with("set_backlight_color", LcdDriver::handle_set_backlight_color)
            .with("on", LcdDriver::handle_on)
            .with("off", LcdDriver::handle_off)
            .with("clear", LcdDriver::handle_clear)
            .with("set_brightness", LcdDriver::handle_set_brightness)
            .with("get_brightness", LcdDriver::handle_get_brightness)
            .with("set_contrast", LcdDriver::handle_set_contrast)
            .with("get_contrast", LcdDriver::handle_get_contrast)
    }

    pub fn state(&self) -> &RenderState {
        &self.state
    }

    pub fn initialize(&mut self) {
        info!(
            "initializing {}x{} LCD",
            self.config.width, self.config.height
        );
        self.client.send(LcdCommand::SetLcdSize {
            cols: self.config.width,
            rows: self.config.height,
        });
        self.client.send(LcdCommand::DisableAutoscroll);
        self.clear();
    }

    /// Brings the panel to `display`, writing only what differs from the
    /// last render.
    pub fn render(&mut self, display: &Display) {
        if self.state.text.as_deref() != Some(display.text.as_str()) {
            self.set_message(&display.text);
        }

        if !display.blink.is_empty() {
            if self.state.blink != display.blink {
                self.set_blink(display.blink.clone());
            }
        } else if self.state.is_blinking() {
            self.set_blink(Vec::new());
        }

        if !self.state.is_blinking() && self.state.color != Some(display.color) {
            self.set_backlight_color(display.color);
        }

        if self.state.backlight != Some(display.backlight) {
            if display.backlight {
                self.on();
            } else {
                self.off();
            }
        }
    }

    pub fn set_message(&mut self, text: &str) {
        debug!("Setting message '{text}'");
        self.clear();
        self.state.text = Some(text.to_string());
        self.state.lines = wrap_lines(text, self.config.width.into());
        self.draw_window();
    }

    pub fn set_blink(&mut self, colors: Vec<Rgb>) {
        self.state.blink = colors;
        self.state.blink_index = 0;
        if let Some(first) = self.state.blink.first().copied() {
            self.write_color(first);
        }
    }

    pub fn set_backlight_color(&mut self, color: Rgb) {
        debug!("Setting backlight color to {color:?}");
        self.write_color(color);
    }

    pub fn on(&mut self) {
        debug!("Setting backlight to on");
        self.state.backlight = Some(true);
        self.client.send(LcdCommand::On(BACKLIGHT_ON));
    }

    pub fn off(&mut self) {
        debug!("Setting backlight to off");
        self.state.backlight = Some(false);
        self.client.send(LcdCommand::Off);
    }

    pub fn clear(&mut self) {
        self.state.text = Some(String::new());
        self.state.lines.clear();
        self.state.offset = 0;
        self.client.send(LcdCommand::Clear);
    }

    /// Steps to the next blink color, if blinking.
    pub fn handle_blink(&mut self) {
        if !self.state.is_blinking() {
            return;
        }
        self.state.blink_index = (self.state.blink_index + 1) % self.state.blink.len();
        self.write_color(self.state.blink[self.state.blink_index]);
    }

    /// Shows the next `height` rows when the text does not fit on the panel.
    pub fn handle_text_cycle(&mut self) {
        let height = usize::from(self.config.height);
        if self.state.lines.len() <= height {
            return;
        }
        self.state.offset += height;
        if self.state.offset >= self.state.lines.len() {
            self.state.offset = 0;
        }
        self.draw_window();
    }

    fn draw_window(&mut self) {
        let text = window(
            &self.state.lines,
            self.state.offset,
            self.config.width.into(),
            self.config.height.into(),
        );
        if text.is_empty() {
            self.off();
            return;
        }
        self.client.send(LcdCommand::CursorHome);
        self.client.send_text(&text);
    }

    fn write_color(&mut self, color: Rgb) {
        self.state.color = Some(color);
        self.client.send(LcdCommand::SetBacklightColor(color));
    }

    /// Polls `mailbox` until `shutdown` fires, one command per tick.
    pub fn run(mut self, mailbox: Mailbox, shutdown: CancellationToken) -> Result<(), CommandError> {
        self.initialize();
        let mut next_blink = Instant::now() + self.config.blink_interval;
        let mut next_cycle = Instant::now() + self.config.text_cycle_interval;

        while !shutdown.is_cancelled() {
            if let Some(envelope) = mailbox.try_recv()? {
                let handler = self.commands.get(&envelope.command);
                dispatch(&mut self, handler, envelope, &mailbox)?;
            }

            let now = Instant::now();
            if now >= next_blink {
                next_blink = now + self.config.blink_interval;
                self.handle_blink();
            }
            if now >= next_cycle {
                next_cycle = now + self.config.text_cycle_interval;
                self.handle_text_cycle();
            }
            thread::sleep(self.config.tick);
        }
        info!("LCD driver stopped");
        Ok(())
    }

    fn handle_message(&mut self, args: Vec<Value>) -> CommandResult {
        let display: Display = arg(&args, 0, "message")?;
        self.render(&display);
        Ok(None)
    }

    fn handle_set_message(&mut self, args: Vec<Value>) -> CommandResult {
        let text: String = arg(&args, 0, "message")?;
        self.set_message(&text);
        Ok(None)
    }

    fn handle_set_blink(&mut self, args: Vec<Value>) -> CommandResult {
        let colors: Vec<Rgb> = arg(&args, 0, "colors")?;
        self.set_blink(colors);
        Ok(None)
    }

    fn handle_set_backlight_color(&mut self, args: Vec<Value>) -> CommandResult {
        let color: Rgb = arg(&args, 0, "color")?;
        self.set_backlight_color(color);
        Ok(None)
    }

    fn handle_on(&mut self, _args: Vec<Value>) -> CommandResult {
        self.on();
        Ok(None)
    }

    fn handle_off(&mut self, _args: Vec<Value>) -> CommandResult {
        self.off();
        Ok(None)
    }

    fn handle_clear(&mut self, _args: Vec<Value>) -> CommandResult {
        self.clear();
        Ok(None)
    }

    fn handle_set_brightness(&mut self, args: Vec<Value>) -> CommandResult {
        let LcdCommand::SetBrightness(value) = LcdCommand::from_name("set_brightness", &args)?
        else {
            return Err(CommandError::Unexpected("set_brightness".to_string()));
        };
        debug!("Setting brightness to {value}");
        self.client.send(LcdCommand::SetBrightness(value));
        self.brightness = value;
        respond(&value)
    }

    fn handle_get_brightness(&mut self, _args: Vec<Value>) -> CommandResult {
        respond(&self.brightness)
    }

    fn handle_set_contrast(&mut self, args: Vec<Value>) -> CommandResult {
        let LcdCommand::SetContrast(value) = LcdCommand::from_name("set_contrast", &args)? else {
            return Err(CommandError::Unexpected("set_contrast".to_string()));
        };
        debug!("Setting contrast to {value}");
        self.client.send(LcdCommand::SetContrast(value));
        self.contrast = value;
        respond(&value)
    }

    fn handle_get_contrast(&mut self, _args: Vec<Value>) -> CommandResult {
        respond(&self.contrast)
    }
}
