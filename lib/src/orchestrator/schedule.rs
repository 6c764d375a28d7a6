//! The queue, the flash override and the rotation state machine.
//!
//! Nothing in here touches a channel or a clock; every time-dependent method
//! takes `now` so a tick can be replayed deterministically.

use chrono::{DateTime, Utc};
use log::{debug, info};

use crate::error::CommandError;
use crate::model::{Display, Flash, FlashDefaults, Message, MessageDefaults};
use crate::schema::deadline;

#[derive(Debug, Clone)]
pub struct Schedule {
    messages: Vec<Message>,
    current: Option<String>,
    until: Option<DateTime<Utc>>,
    flash: Option<Flash>,
    flash_until: Option<DateTime<Utc>>,
    message_defaults: MessageDefaults,
    flash_defaults: FlashDefaults,
}

impl Schedule {
    pub fn new(message_defaults: MessageDefaults, flash_defaults: FlashDefaults) -> Self {
        Self {
            messages: Vec::new(),
            current: None,
            until: None,
            flash: None,
            flash_until: None,
            message_defaults,
            flash_defaults,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn message(&self, id: &str) -> Option<&Message> {
        self.messages.iter().find(|message| message.id == id)
    }

    pub fn current_id(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn until(&self) -> Option<DateTime<Utc>> {
        self.until
    }

    pub fn flash(&self) -> Option<&Flash> {
        self.flash.as_ref()
    }

    pub fn flash_until(&self) -> Option<DateTime<Utc>> {
        self.flash_until
    }

    pub fn flash_defaults(&self) -> &FlashDefaults {
        &self.flash_defaults
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.messages.iter().position(|message| message.id == id)
    }

    /// Appends to the end of the rotation. Ids must be unique.
    pub fn push(&mut self, message: Message) -> Result<(), CommandError> {
        if self.position(&message.id).is_some() {
            return Err(CommandError::Validation(format!(
                "Message {} already exists",
                message.id
            )));
        }
        debug!("queueing message {}", message.id);
        self.messages.push(message);
        Ok(())
    }

    /// Overwrites in place, keeping the rotation slot, or appends. Returns
    /// `true` when the message was new.
    pub fn upsert(&mut self, message: Message) -> bool {
        match self.position(&message.id) {
            Some(index) => {
                debug!("replacing message {}", message.id);
                self.messages[index] = message;
                false
            }
            None => {
                debug!("queueing message {}", message.id);
                self.messages.push(message);
                true
            }
        }
    }

    /// Moves the selection one step forward, wrapping at the end.
    pub fn advance(&mut self) {
        self.until = None;
        if self.messages.is_empty() {
            self.current = None;
            return;
        }
        let next = self
            .current
            .as_deref()
            .and_then(|id| self.position(id))
            .map_or(0, |index| (index + 1) % self.messages.len());
        self.current = Some(self.messages[next].id.clone());
        debug!("advancing to {next}: {:?}", self.current);
    }

    /// Removes a message. If it is on screen the selection advances first.
    pub fn remove(&mut self, id: &str) -> Result<Message, CommandError> {
        let index = self
            .position(id)
            .ok_or_else(|| CommandError::NotFound(format!("Message {id} does not exist")))?;
        if self.current.as_deref() == Some(id) {
            self.advance();
        }
        // advancing never reorders the queue
        let removed = self.messages.remove(index);
        if self.messages.is_empty() {
            self.current = None;
            self.until = None;
        }
        Ok(removed)
    }

    pub fn set_flash(&mut self, flash: Flash) {
        self.flash = Some(flash);
        self.flash_until = None;
    }

    pub fn clear_flash(&mut self) {
        self.flash = None;
        self.flash_until = None;
    }

    /// Drops expired messages and an expired flash, then advances if the
    /// current message has had its turn.
    pub fn sweep(&mut self, now: DateTime<Utc>) {
        let expired: Vec<String> = self
            .messages
            .iter()
            .filter(|message| message.is_expired(now))
            .map(|message| message.id.clone())
            .collect();
        for id in expired {
            info!("Message {id} has expired.");
            if let Ok(message) = self.remove(&id) {
                debug!("expired message contents: {message:?}");
            }
        }

        if self.flash.is_some() && self.flash_until.is_some_and(|until| until < now) {
            info!("Flash message has expired");
            self.clear_flash();
        }

        if !self.messages.is_empty() && self.until.is_some_and(|until| until < now) {
            self.advance();
        }
    }

    /// What belongs on the panel at `now`: the flash, else the selected
    /// message, else the empty placeholder. Starts the flash timeout and the
    /// message interval the first time each is shown.
    pub fn current_display(&mut self, now: DateTime<Utc>) -> Display {
        self.sweep(now);

        if let Some(flash) = &self.flash {
            if self.flash_until.is_none() {
                self.flash_until = Some(deadline(now, flash.timeout_or(&self.flash_defaults)));
            }
            return flash.resolve(&self.flash_defaults);
        }

        if self.messages.is_empty() {
            return Display::no_messages();
        }

        let index = match self.current.as_deref().and_then(|id| self.position(id)) {
            Some(index) => index,
            None => {
                self.current = Some(self.messages[0].id.clone());
                0
            }
        };
        if self.until.is_none() {
            self.until = Some(deadline(now, self.message_defaults.interval));
        }
        self.messages[index].resolve(&self.message_defaults)
    }
}

impl Default for Schedule {
    fn default() -> Self {
        Self::new(MessageDefaults::default(), FlashDefaults::default())
    }
}
