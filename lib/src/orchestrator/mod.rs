//! The orchestrator actor: owns the [`Schedule`], answers front-end commands
//! and pushes the resolved display to the LCD driver every tick.

pub mod schedule;

use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::actor::{CommandRegistry, CommandResult, Envelope, Mailbox, arg, dispatch, respond};
use crate::error::CommandError;
use crate::model::{FlashDefaults, MessageDefaults};
use crate::schema::{MessagePayload, validate_level};

pub use schedule::Schedule;

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub tick: Duration,
    /// Bound on each round trip to the LCD driver.
    pub request_timeout: Duration,
    pub message_defaults: MessageDefaults,
    pub flash_defaults: FlashDefaults,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(200),
            request_timeout: Duration::from_millis(5000),
            message_defaults: MessageDefaults::default(),
            flash_defaults: FlashDefaults::default(),
        }
    }
}

pub struct Orchestrator {
    schedule: Schedule,
    lcd: Mailbox,
    commands: CommandRegistry<Orchestrator>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(
        config: OrchestratorConfig,
        lcd: Mailbox,
        commands: CommandRegistry<Orchestrator>,
    ) -> Self {
        Self {
            schedule: Schedule::new(
                config.message_defaults.clone(),
                config.flash_defaults.clone(),
            ),
            lcd,
            commands,
            config,
        }
    }

    /// The front-end command set.
    pub fn commands() -> CommandRegistry<Orchestrator> {
        CommandRegistry::new()
            .with("get_messages", Orchestrator::get_messages)
            .with("get_message_by_id", Orchestrator::get_message_by_id)
            .with("post_message", Orchestrator::post_message)
            .with("put_message_by_id", Orchestrator::put_message_by_id)
            .with("patch_message_by_id", Orchestrator::patch_message_by_id)
            .with("delete_message_by_id", Orchestrator::delete_message_by_id)
            .with("get_flash", Orchestrator::get_flash)
            .with("put_flash", Orchestrator::put_flash)
            .with("delete_flash", Orchestrator::delete_flash)
            .with("get_brightness", Orchestrator::get_brightness)
            .with("set_brightness", Orchestrator::set_brightness)
            .with("get_contrast", Orchestrator::get_contrast)
            .with("set_contrast", Orchestrator::set_contrast)
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    /// Dispatches one front-end command and replies on `web`.
    pub fn handle(&mut self, envelope: Envelope, web: &Mailbox) -> Result<(), CommandError> {
        info!("WEB Command Received {}{:?}", envelope.command, envelope.args);
        let handler = self.commands.get(&envelope.command);
        dispatch(self, handler, envelope, web)
    }

    pub fn update_screen(&mut self) -> Result<(), CommandError> {
        self.update_screen_at(Utc::now())
    }

    pub fn update_screen_at(&mut self, now: DateTime<Utc>) -> Result<(), CommandError> {
        let display = self.schedule.current_display(now);
        let value = serde_json::to_value(&display)
            .map_err(|e| CommandError::Unexpected(e.to_string()))?;
        self.lcd.send("message", vec![value])
    }

    /// Polls `web` until `shutdown` fires. Returns an error only when a peer
    /// channel is gone.
    pub fn run(mut self, web: Mailbox, shutdown: CancellationToken) -> Result<(), CommandError> {
        info!("Waiting for data");
        while !shutdown.is_cancelled() {
            if let Some(envelope) = web.try_recv()? {
                debug!("Data received from WEB {}:{:?}", envelope.command, envelope.args);
                self.handle(envelope, &web)?;
            }
            while let Some(envelope) = self.lcd.try_recv()? {
                warn!(
                    "discarding unsolicited '{}' from lcd: {:?}",
                    envelope.command, envelope.args
                );
            }
            thread::sleep(self.config.tick);
            self.update_screen()?;
        }
        info!("orchestrator stopped");
        Ok(())
    }

    fn lcd_request(&self, command: &str, args: Vec<Value>) -> CommandResult {
        let value = self
            .lcd
            .request(command, args, self.config.request_timeout)?;
        Ok(Some(value))
    }

    fn get_messages(&mut self, _args: Vec<Value>) -> CommandResult {
        respond(&self.schedule.messages())
    }

    fn get_message_by_id(&mut self, args: Vec<Value>) -> CommandResult {
        let id: String = arg(&args, 0, "id")?;
        match self.schedule.message(&id) {
            Some(message) => respond(message),
            None => Err(not_found(&id)),
        }
    }

    fn post_message(&mut self, args: Vec<Value>) -> CommandResult {
        let payload = MessagePayload::from_value(arg(&args, 0, "message")?)?;
        let id = payload
            .id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().simple().to_string());
        let message = payload.into_message(id, Utc::now())?;
        self.schedule.push(message.clone())?;
        respond(&message)
    }

    fn put_message_by_id(&mut self, args: Vec<Value>) -> CommandResult {
        let id: String = arg(&args, 0, "id")?;
        let payload = MessagePayload::from_value(arg(&args, 1, "message")?)?;
        let message = payload.into_message(id, Utc::now())?;
        self.schedule.upsert(message.clone());
        respond(&message)
    }

    fn patch_message_by_id(&mut self, args: Vec<Value>) -> CommandResult {
        let id: String = arg(&args, 0, "id")?;
        let patch: Map<String, Value> = arg(&args, 1, "message")?;
        let existing = self.schedule.message(&id).ok_or_else(|| not_found(&id))?;

        let mut merged = match serde_json::to_value(MessagePayload::from(existing)) {
            Ok(Value::Object(fields)) => fields,
            _ => Map::new(),
        };
        merged.extend(patch);

        let payload = MessagePayload::from_value(Value::Object(merged))?;
        let message = payload.into_message(id, Utc::now())?;
        self.schedule.upsert(message.clone());
        respond(&message)
    }

    fn delete_message_by_id(&mut self, args: Vec<Value>) -> CommandResult {
        let id: String = arg(&args, 0, "id")?;
        self.schedule.remove(&id)?;
        respond(&"OK")
    }

    fn get_flash(&mut self, _args: Vec<Value>) -> CommandResult {
        match self.schedule.flash() {
            Some(flash) => respond(flash),
            None => Err(CommandError::NotFound("Flash message not set".to_string())),
        }
    }

    fn put_flash(&mut self, args: Vec<Value>) -> CommandResult {
        let flash = MessagePayload::from_value(arg(&args, 0, "message")?)?.into_flash(Utc::now())?;
        let merged = flash.with_defaults(self.schedule.flash_defaults());
        self.schedule.set_flash(flash);
        respond(&merged)
    }

    fn delete_flash(&mut self, _args: Vec<Value>) -> CommandResult {
        self.schedule.clear_flash();
        respond(&"OK")
    }

    fn get_brightness(&mut self, _args: Vec<Value>) -> CommandResult {
        self.lcd_request("get_brightness", vec![])
    }

    fn set_brightness(&mut self, args: Vec<Value>) -> CommandResult {
        let level = validate_level(args.first().unwrap_or(&Value::Null))?;
        self.lcd_request("set_brightness", vec![Value::from(level)])
    }

    fn get_contrast(&mut self, _args: Vec<Value>) -> CommandResult {
        self.lcd_request("get_contrast", vec![])
    }

    fn set_contrast(&mut self, args: Vec<Value>) -> CommandResult {
        let level = validate_level(args.first().unwrap_or(&Value::Null))?;
        self.lcd_request("set_contrast", vec![Value::from(level)])
    }
}

fn not_found(id: &str) -> CommandError {
    CommandError::NotFound(format!("Message {id} does not exist"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::{ERROR, RESPONSE};
    use serde_json::json;

    struct Harness {
        orchestrator: Orchestrator,
        web: Mailbox,
        client: Mailbox,
        lcd: Mailbox,
    }

    fn harness() -> Harness {
        let (client, web) = Mailbox::pair("web", "orchestrator");
        let (orch_lcd, lcd) = Mailbox::pair("orchestrator", "lcd");
        let config = OrchestratorConfig {
            request_timeout: Duration::from_secs(2),
            ..OrchestratorConfig::default()
        };
        Harness {
            orchestrator: Orchestrator::new(config, orch_lcd, Orchestrator::commands()),
            web,
            client,
            lcd,
        }
    }

    impl Harness {
        fn call(&mut self, command: &str, args: Vec<Value>) -> Result<Value, CommandError> {
            self.client.send(command, args).unwrap();
            let envelope = self.web.try_recv().unwrap().unwrap();
            self.orchestrator.handle(envelope, &self.web).unwrap();
            let reply = self.client.try_recv().unwrap().expect("no reply");
            match reply.command.as_str() {
                RESPONSE => Ok(reply.args[0].clone()),
                ERROR => Err(serde_json::from_value(reply.args[0].clone()).unwrap()),
                other => panic!("unexpected reply {other}"),
            }
        }
    }

    #[test]
    fn test_post_assigns_hex_id() {
        let mut h = harness();
        let record = h.call("post_message", vec![json!({"message": "hi"})]).unwrap();
        let id = record["id"].as_str().unwrap();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(record["message"], "hi");

        let fetched = h.call("get_message_by_id", vec![json!(id)]).unwrap();
        assert_eq!(fetched, record);
    }

    #[test]
    fn test_post_keeps_client_id_and_rejects_duplicates() {
        let mut h = harness();
        let body = json!({"message": "hi", "id": "greeting"});
        let record = h.call("post_message", vec![body.clone()]).unwrap();
        assert_eq!(record["id"], "greeting");
        assert!(matches!(
            h.call("post_message", vec![body]),
            Err(CommandError::Validation(_))
        ));
    }

    #[test]
    fn test_post_rejects_invalid_payload() {
        let mut h = harness();
        assert!(matches!(
            h.call("post_message", vec![json!({"message": "hi", "bogus": 1})]),
            Err(CommandError::Validation(_))
        ));
        assert!(h.orchestrator.schedule().messages().is_empty());
    }

    #[test]
    fn test_get_messages_in_insertion_order() {
        let mut h = harness();
        for id in ["one", "two"] {
            h.call("post_message", vec![json!({"message": id, "id": id})])
                .unwrap();
        }
        let list = h.call("get_messages", vec![]).unwrap();
        let ids: Vec<_> = list
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, ["one", "two"]);
    }

    #[test]
    fn test_lookup_uses_requested_id() {
        let mut h = harness();
        h.call("post_message", vec![json!({"message": "a", "id": "a"})])
            .unwrap();
        h.orchestrator.update_screen().unwrap();
        assert!(matches!(
            h.call("get_message_by_id", vec![json!("b")]),
            Err(CommandError::NotFound(_))
        ));
        assert!(matches!(
            h.call("delete_message_by_id", vec![json!("b")]),
            Err(CommandError::NotFound(_))
        ));
        assert!(matches!(
            h.call("patch_message_by_id", vec![json!("b"), json!({"color": [1, 2, 3]})]),
            Err(CommandError::NotFound(_))
        ));
    }

    #[test]
    fn test_put_creates_then_overwrites() {
        let mut h = harness();
        let created = h
            .call("put_message_by_id", vec![json!("x"), json!({"message": "first"})])
            .unwrap();
        assert_eq!(created["id"], "x");

        let replaced = h
            .call(
                "put_message_by_id",
                vec![json!("x"), json!({"message": "second", "id": "ignored"})],
            )
            .unwrap();
        assert_eq!(replaced, json!({"id": "x", "message": "second"}));
        assert_eq!(h.orchestrator.schedule().messages().len(), 1);
    }

    #[test]
    fn test_patch_merges_and_revalidates() {
        let mut h = harness();
        h.call(
            "post_message",
            vec![json!({"message": "hi", "id": "p", "color": [1, 1, 1]})],
        )
        .unwrap();

        let patched = h
            .call("patch_message_by_id", vec![json!("p"), json!({"backlight": false})])
            .unwrap();
        assert_eq!(
            patched,
            json!({"id": "p", "message": "hi", "color": [1, 1, 1], "backlight": false})
        );

        assert!(matches!(
            h.call("patch_message_by_id", vec![json!("p"), json!({"color": "red"})]),
            Err(CommandError::Validation(_))
        ));
        assert!(matches!(
            h.call("patch_message_by_id", vec![json!("p"), json!("not an object")]),
            Err(CommandError::Validation(_))
        ));
        let stored = h.call("get_message_by_id", vec![json!("p")]).unwrap();
        assert_eq!(stored, patched);
    }

    #[test]
    fn test_delete_returns_ok() {
        let mut h = harness();
        h.call("post_message", vec![json!({"message": "hi", "id": "d"})])
            .unwrap();
        assert_eq!(
            h.call("delete_message_by_id", vec![json!("d")]).unwrap(),
            json!("OK")
        );
        assert!(matches!(
            h.call("get_message_by_id", vec![json!("d")]),
            Err(CommandError::NotFound(_))
        ));
    }

    #[test]
    fn test_flash_lifecycle() {
        let mut h = harness();
        assert_eq!(
            h.call("get_flash", vec![]).unwrap_err(),
            CommandError::NotFound("Flash message not set".to_string())
        );

        let merged = h
            .call(
                "put_flash",
                vec![json!({"message": "alert", "id": "door", "expires": "2030-01-01"})],
            )
            .unwrap();
        assert_eq!(
            merged,
            json!({
                "message": "alert",
                "color": [255, 255, 255],
                "backlight": true,
                "blink": [[255, 0, 0], [0, 0, 0]],
                "timeout": 10,
                "expires": "2030-01-01",
                "id": "door",
            })
        );
        assert_eq!(
            h.call("get_flash", vec![]).unwrap(),
            json!({"message": "alert", "expires": "2030-01-01", "id": "door"})
        );

        let err = h
            .call("put_flash", vec![json!({"message": "alert", "expires": "whenever"})])
            .unwrap_err();
        assert!(matches!(err, CommandError::Validation(_)));
        assert_eq!(h.orchestrator.schedule().flash().unwrap().id.as_deref(), Some("door"));

        assert_eq!(h.call("delete_flash", vec![]).unwrap(), json!("OK"));
        assert!(h.orchestrator.schedule().flash().is_none());
    }

    #[test]
    fn test_unknown_command() {
        let mut h = harness();
        assert_eq!(
            h.call("reboot", vec![]).unwrap_err(),
            CommandError::UnknownCommand("reboot".to_string())
        );
    }

    #[test]
    fn test_update_screen_sends_resolved_display() {
        let mut h = harness();
        h.orchestrator.update_screen().unwrap();
        let envelope = h.lcd.try_recv().unwrap().unwrap();
        assert_eq!(envelope.command, "message");
        assert_eq!(
            envelope.args,
            vec![json!({"message": "", "color": [255, 255, 255], "backlight": false, "blink": []})]
        );

        h.call("post_message", vec![json!({"message": "hi"})]).unwrap();
        h.orchestrator.update_screen().unwrap();
        let envelope = h.lcd.try_recv().unwrap().unwrap();
        assert_eq!(envelope.args[0]["message"], "hi");
        assert_eq!(envelope.args[0]["backlight"], true);
    }

    #[test]
    fn test_brightness_round_trips_through_lcd() {
        let mut h = harness();
        let lcd = h.lcd;
        let fake_driver = thread::spawn(move || {
            for _ in 0..2 {
                let envelope = loop {
                    if let Some(envelope) = lcd.try_recv().unwrap() {
                        break envelope;
                    }
                    thread::sleep(Duration::from_millis(5));
                };
                let value = match envelope.command.as_str() {
                    "set_brightness" => envelope.args[0].clone(),
                    "get_brightness" => json!(128),
                    other => panic!("unexpected {other}"),
                };
                lcd.send(RESPONSE, vec![value]).unwrap();
            }
        });
        h.lcd = Mailbox::pair("unused", "unused").0;

        assert_eq!(h.call("set_brightness", vec![json!(128)]).unwrap(), json!(128));
        assert_eq!(h.call("get_brightness", vec![]).unwrap(), json!(128));
        fake_driver.join().unwrap();
    }

    #[test]
    fn test_out_of_range_level_never_reaches_lcd() {
        let mut h = harness();
        assert!(matches!(
            h.call("set_contrast", vec![json!(0)]),
            Err(CommandError::Validation(_))
        ));
        assert!(matches!(
            h.call("set_contrast", vec![json!("dim")]),
            Err(CommandError::BadRequest(_))
        ));
        assert!(h.lcd.try_recv().unwrap().is_none());
    }

    #[test]
    fn test_lcd_timeout_is_reported() {
        let mut h = harness();
        h.orchestrator.config.request_timeout = Duration::from_millis(20);
        assert!(matches!(
            h.call("get_contrast", vec![]),
            Err(CommandError::Timeout { .. })
        ));
    }

    #[test]
    fn test_run_exits_on_shutdown() {
        let h = harness();
        let shutdown = CancellationToken::new();
        shutdown.cancel();
        h.orchestrator.run(h.web, shutdown).unwrap();
    }
}
