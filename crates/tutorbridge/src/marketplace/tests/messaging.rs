use super::common::*;
use crate::marketplace::domain::{Actor, Conversation, UserId};
use crate::marketplace::{Marketplace, MarketplaceError, NewConversation, NewMessage};

fn pair() -> NewConversation {
    NewConversation {
        tutor_id: UserId::from(TUTOR),
        student_id: UserId::from(STUDENT),
    }
}

fn text(content: &str) -> NewMessage {
    NewMessage {
        content: content.to_string(),
    }
}

async fn opened(marketplace: &Marketplace) -> Conversation {
    marketplace
        .messaging
        .ensure_conversation(&student(), pair())
        .await
        .expect("open conversation")
}

#[tokio::test]
async fn one_conversation_per_tutor_and_student() {
    let (marketplace, _) = build_marketplace();
    let first = opened(&marketplace).await;
    let from_tutor = marketplace
        .messaging
        .ensure_conversation(&tutor(), pair())
        .await
        .expect("tutor reopens");

    assert_eq!(first.id, from_tutor.id);
    let listed = marketplace
        .messaging
        .list_conversations(&tutor())
        .await
        .expect("list");
    assert_eq!(listed.len(), 1);
    let strangers = marketplace
        .messaging
        .list_conversations(&second_tutor())
        .await
        .expect("list");
    assert!(strangers.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_opens_share_one_conversation() {
    let (marketplace, _) = build_marketplace();
    let marketplace = std::sync::Arc::new(marketplace);

    let mut handles = Vec::new();
    for actor in [student(), tutor(), student(), tutor()] {
        let marketplace = std::sync::Arc::clone(&marketplace);
        handles.push(tokio::spawn(async move {
            marketplace.messaging.ensure_conversation(&actor, pair()).await
        }));
    }
    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.expect("task joins").expect("conversation").id);
    }
    ids.dedup();
    assert_eq!(ids.len(), 1);
}

#[tokio::test]
async fn outsiders_cannot_open_or_read_conversations() {
    let (marketplace, _) = build_marketplace();
    let denied = marketplace
        .messaging
        .ensure_conversation(&second_tutor(), pair())
        .await;
    assert!(matches!(denied, Err(MarketplaceError::Forbidden { .. })));

    let conversation = opened(&marketplace).await;
    let read = marketplace
        .messaging
        .messages(&second_tutor(), &conversation.id)
        .await;
    assert!(matches!(read, Err(MarketplaceError::Forbidden { .. })));
    let write = marketplace
        .messaging
        .send(&admin(), &conversation.id, text("hello"))
        .await;
    assert!(matches!(write, Err(MarketplaceError::Forbidden { .. })));

    let audit = marketplace
        .messaging
        .messages(&admin(), &conversation.id)
        .await
        .expect("admin reads");
    assert!(audit.is_empty());
}

#[tokio::test]
async fn messages_come_back_oldest_first() {
    let (marketplace, _) = build_marketplace();
    let conversation = opened(&marketplace).await;

    for (actor, content) in [
        (student(), "Are you free on Sunday?"),
        (tutor(), "Yes, from 5pm"),
        (student(), "  See you then  "),
    ] {
        marketplace
            .messaging
            .send(&actor, &conversation.id, text(content))
            .await
            .expect("send");
    }

    let thread = marketplace
        .messaging
        .messages(&tutor(), &conversation.id)
        .await
        .expect("thread");
    let contents: Vec<&str> = thread.iter().map(|message| message.content.as_str()).collect();
    assert_eq!(
        contents,
        vec!["Are you free on Sunday?", "Yes, from 5pm", "See you then"]
    );
    assert_eq!(thread[1].sender_id.as_str(), TUTOR);
    assert!(thread.iter().all(|message| !message.is_read));
}

#[tokio::test]
async fn blank_messages_are_rejected() {
    let (marketplace, _) = build_marketplace();
    let conversation = opened(&marketplace).await;
    match marketplace
        .messaging
        .send(&student(), &conversation.id, text("   "))
        .await
    {
        Err(MarketplaceError::ValidationFailed { fields }) => assert_eq!(fields, vec!["content"]),
        other => panic!("expected validation failure, got {other:?}"),
    }
}

#[tokio::test]
async fn marking_read_only_touches_the_other_side() {
    let (marketplace, _) = build_marketplace();
    let conversation = opened(&marketplace).await;
    for (actor, content) in [(student(), "one"), (student(), "two"), (tutor(), "three")] {
        marketplace
            .messaging
            .send(&actor, &conversation.id, text(content))
            .await
            .expect("send");
    }

    let marked = marketplace
        .messaging
        .mark_read(&tutor(), &conversation.id)
        .await
        .expect("mark read");
    assert_eq!(marked, 2);
    let again = marketplace
        .messaging
        .mark_read(&tutor(), &conversation.id)
        .await
        .expect("mark read");
    assert_eq!(again, 0);

    let thread = marketplace
        .messaging
        .messages(&student(), &conversation.id)
        .await
        .expect("thread");
    let unread: Vec<&str> = thread
        .iter()
        .filter(|message| !message.is_read)
        .map(|message| message.content.as_str())
        .collect();
    assert_eq!(unread, vec!["three"]);
}

#[tokio::test]
async fn missing_conversation_is_not_found() {
    let (marketplace, _) = build_marketplace();
    let result = marketplace
        .messaging
        .send(
            &Actor::student(STUDENT),
            &"conv-missing".into(),
            text("hello"),
        )
        .await;
    assert!(matches!(
        result,
        Err(MarketplaceError::NotFound {
            entity: "conversation",
            ..
        })
    ));
}
