//! Menu parsing for the interactive client, kept free of I/O so it can be
//! tested directly.

use crate::transport::message::ClientMessage;

pub const MENU: &str = "Select an action:
1. Create a topic
2. Subscribe to a topic
3. Push a message to a topic
4. Unsubscribe from a topic
0. Exit";

const TOPIC_ONLY: &[&str] = &["Enter the topic name: "];
const TOPIC_AND_MESSAGE: &[&str] = &["Enter the topic name: ", "Enter the message to push: "];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuChoice {
    CreateTopic,
    Subscribe,
    Push,
    Unsubscribe,
    Exit,
}

impl MenuChoice {
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim() {
            "1" => Some(MenuChoice::CreateTopic),
            "2" => Some(MenuChoice::Subscribe),
            "3" => Some(MenuChoice::Push),
            "4" => Some(MenuChoice::Unsubscribe),
            "0" => Some(MenuChoice::Exit),
            _ => None,
        }
    }

    /// Prompts shown, in order, before the request can be built.
    pub fn prompts(self) -> &'static [&'static str] {
        match self {
            MenuChoice::CreateTopic | MenuChoice::Subscribe | MenuChoice::Unsubscribe => {
                TOPIC_ONLY
            }
            MenuChoice::Push => TOPIC_AND_MESSAGE,
            MenuChoice::Exit => &[],
        }
    }

    /// Build the protocol request from the answers to `prompts()`.
    pub fn request(self, answers: &[String]) -> Option<ClientMessage> {
        let topic = answers.first().map(|s| s.trim().to_string())?;
        let request = match self {
            MenuChoice::CreateTopic => ClientMessage::CreateTopic { topic },
            MenuChoice::Subscribe => ClientMessage::Subscribe {
                topic,
                subscriber_id: None,
            },
            MenuChoice::Unsubscribe => ClientMessage::Unsubscribe { topic },
            MenuChoice::Push => ClientMessage::Publish {
                topic,
                payload: answers.get(1)?.trim().to_string(),
            },
            MenuChoice::Exit => return None,
        };
        Some(request)
    }
}
