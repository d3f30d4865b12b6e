//! The hub's built-in push button (C7). Not a real port peripheral: it
//! rides the `HubProperties(BUTTON, ...)` property instead of a
//! port/mode pair, so it is wired directly to the session rather than
//! through [`super::PeripheralCore`].

use crate::error::Result;
use crate::message::{HubPropertiesMessage, HubPropertyReference, HubPropertyValue, Message};
use crate::session::Hub;
use std::sync::Mutex;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ButtonState {
    Released = 0,
    Up = 1,
    Pressed = 2,
    Stop = 0x7f,
    Down = 0xff,
}

impl ButtonState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => ButtonState::Up,
            2 => ButtonState::Pressed,
            0x7f => ButtonState::Stop,
            0xff => ButtonState::Down,
            _ => ButtonState::Released,
        }
    }
}

type Callback = Box<dyn Fn(ButtonState) + Send + Sync>;

pub struct Button {
    hub: Hub,
    subscribers: std::sync::Arc<Mutex<Vec<Callback>>>,
}

impl Button {
    pub async fn new(hub: Hub) -> Self {
        let subscribers: std::sync::Arc<Mutex<Vec<Callback>>> = Default::default();
        let dispatch_to = subscribers.clone();
        hub.add_message_handler(
            &Message::HubProperties(HubPropertiesMessage::request(HubPropertyReference::Button)),
            Box::new(move |msg| {
                let Message::HubProperties(p) = msg else { return };
                let HubPropertyValue::Button(state) = p.value else { return };
                for cb in dispatch_to.lock().unwrap().iter() {
                    cb(ButtonState::from_u8(state));
                }
            }),
        )
        .await;
        Self { hub, subscribers }
    }

    pub async fn subscribe(&self, cb: Callback) -> Result<()> {
        let was_empty = self.subscribers.lock().unwrap().is_empty();
        self.subscribers.lock().unwrap().push(cb);
        if was_empty {
            self.hub
                .send(Message::HubProperties(HubPropertiesMessage::enable_updates(
                    HubPropertyReference::Button,
                )))
                .await?;
        }
        Ok(())
    }

    pub async fn unsubscribe_all(&self) -> Result<()> {
        self.subscribers.lock().unwrap().clear();
        self.hub
            .send(Message::HubProperties(HubPropertiesMessage::disable_updates(
                HubPropertyReference::Button,
            )))
            .await?;
        Ok(())
    }
}
