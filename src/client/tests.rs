use super::menu::MenuChoice;
use crate::transport::message::ClientMessage;

#[test]
fn test_menu_choice_parse() {
    assert_eq!(MenuChoice::parse("1\n"), Some(MenuChoice::CreateTopic));
    assert_eq!(MenuChoice::parse(" 2 "), Some(MenuChoice::Subscribe));
    assert_eq!(MenuChoice::parse("3"), Some(MenuChoice::Push));
    assert_eq!(MenuChoice::parse("4"), Some(MenuChoice::Unsubscribe));
    assert_eq!(MenuChoice::parse("0"), Some(MenuChoice::Exit));
    assert_eq!(MenuChoice::parse("7"), None);
    assert_eq!(MenuChoice::parse(""), None);
}

#[test]
fn test_push_request_needs_topic_and_message() {
    let choice = MenuChoice::Push;
    assert_eq!(choice.prompts().len(), 2);

    let request = choice.request(&["news\n".to_string(), " hello \n".to_string()]);
    assert_eq!(
        request,
        Some(ClientMessage::Publish {
            topic: "news".to_string(),
            payload: "hello".to_string(),
        })
    );
    assert_eq!(choice.request(&["news".to_string()]), None);
}

#[test]
fn test_subscribe_request_uses_connection_id() {
    let request = MenuChoice::Subscribe.request(&["news".to_string()]);
    assert_eq!(
        request,
        Some(ClientMessage::Subscribe {
            topic: "news".to_string(),
            subscriber_id: None,
        })
    );
}

#[test]
fn test_exit_builds_no_request() {
    assert!(MenuChoice::Exit.prompts().is_empty());
    assert_eq!(MenuChoice::Exit.request(&["x".to_string()]), None);
}
