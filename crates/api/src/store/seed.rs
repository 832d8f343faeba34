//! Demo data loaded at startup

use std::collections::HashMap;

use chatrelay_shared::{
    Conversation, Message, MessageContent, Role, Source, ToolOutput, ToolResult,
};
use chrono::{Duration, Utc};

const API_KEY_GUIDE: &str = "First, obtain your API key from the dashboard. Then, make authenticated requests using the bearer token format. All API endpoints require authentication via the Authorization header.";

const ANALYTICS_OVERVIEW: &str = "Our platform offers comprehensive analytics and real-time monitoring capabilities. Users can track key metrics, set up custom alerts, and generate detailed reports. The analytics dashboard provides visualization tools including charts, graphs, and customizable widgets.";

const BEST_PRACTICES: &str = "We recommend implementing caching strategies, batching requests when possible. Using webhooks for real-time updates rather than polling. Batching multiple operations into a single request improves efficiency.";

/// The fixed citation list attached to generated answers
pub fn fixed_sources() -> Vec<Source> {
    let best_practice_parts = vec![
        "We recommend implementing caching strategies, batching requests when possible."
            .to_string(),
        "Using webhooks for real-time updates rather than polling.".to_string(),
        "Batching multiple operations into a single request improves efficiency.".to_string(),
    ];

    vec![
        Source {
            id: "source-1".to_string(),
            name: "Product Documentation".to_string(),
            text: format!(
                "# Heading 1\n{}{}",
                API_KEY_GUIDE.repeat(13),
                ANALYTICS_OVERVIEW
            ),
            relevant_parts: vec![
                "Our platform offers comprehensive analytics and real-time monitoring capabilities."
                    .to_string(),
                "Users can track key metrics, set up custom alerts, and generate detailed reports."
                    .to_string(),
                "The analytics dashboard provides visualization tools including charts, graphs, and customizable widgets."
                    .to_string(),
            ],
        },
        Source {
            id: "source-2".to_string(),
            name: "Knowledge Base Article".to_string(),
            text: API_KEY_GUIDE.to_string(),
            relevant_parts: vec![
                "First, obtain your API key from the dashboard.".to_string(),
                "Make authenticated requests using the bearer token format.".to_string(),
                "All API endpoints require authentication via the Authorization header."
                    .to_string(),
            ],
        },
        Source {
            id: "source-3".to_string(),
            name: "Best Practices Guide".to_string(),
            text: BEST_PRACTICES.to_string(),
            relevant_parts: best_practice_parts.clone(),
        },
        Source {
            id: "source-4".to_string(),
            name: "Best Practices Guide".to_string(),
            text: BEST_PRACTICES.to_string(),
            relevant_parts: best_practice_parts,
        },
    ]
}

fn seeded_message(id: &str, role: Role, content: MessageContent, minutes_ago: i64) -> Message {
    Message {
        id: id.to_string(),
        role,
        content,
        created_at: Utc::now() - Duration::minutes(minutes_ago),
        sources: None,
        feedback: None,
    }
}

/// Seed conversations, newest first, with their messages oldest first
pub fn conversations() -> (Vec<Conversation>, HashMap<String, Vec<Message>>) {
    let conversations = vec![
        ("seed-1", "Welcome Conversation"),
        ("seed-2", "Getting Started"),
        ("seed-3", "Help & Support"),
        ("seed-4", "Quick Tips"),
    ]
    .into_iter()
    .map(|(id, title)| Conversation {
        id: id.to_string(),
        title: title.to_string(),
    })
    .collect();

    let mut messages = HashMap::new();

    messages.insert(
        "seed-1".to_string(),
        vec![
            Message {
                sources: Some(fixed_sources()),
                ..seeded_message(
                    "seed-1-msg-1",
                    Role::Assistant,
                    "Hi there! I'm your AI assistant. How can I help you today?".into(),
                    5,
                )
            },
            seeded_message("seed-1-msg-2", Role::User, "What can you help me with?".into(), 4),
            seeded_message(
                "seed-1-msg-tool",
                Role::Tool,
                MessageContent::ToolResults(vec![ToolResult {
                    tool_call_id: "get-capabilities-1".to_string(),
                    tool_name: "get_capabilities".to_string(),
                    output: ToolOutput::Text {
                        value: "Available capabilities: code assistance, data analysis, general questions"
                            .to_string(),
                    },
                }]),
                3,
            ),
            seeded_message(
                "seed-1-msg-3",
                Role::Assistant,
                "I can help you with several things including:\n1. Code assistance\n2. Data analysis\n3. General questions\nWhat would you like to explore?"
                    .into(),
                2,
            ),
        ],
    );

    messages.insert(
        "seed-2".to_string(),
        vec![
            seeded_message(
                "seed-2-msg-1",
                Role::Assistant,
                "Welcome! I'm here to help you get started. What would you like to know first?"
                    .into(),
                30,
            ),
            seeded_message(
                "seed-2-msg-2",
                Role::User,
                "Give me an overview of the available features".into(),
                29,
            ),
            seeded_message(
                "seed-2-msg-3",
                Role::Assistant,
                "Here's an overview of what I can help you with:\n\n• **Code Assistance**: I can help debug, write, and explain code\n• **Data Analysis**: Analyze datasets and provide insights\n• **General Questions**: Answer questions on a wide range of topics\n• **Problem Solving**: Help break down complex problems"
                    .into(),
                28,
            ),
        ],
    );

    let tips = "Here are some tips for getting the most out of this tool:\n\n1. **Be Specific**: The more details you provide, the better I can help\n2. **Use Examples**: Share code snippets or examples when relevant\n3. **Ask Follow-ups**: Don't hesitate to ask for clarification or elaboration";
    let mut support = vec![seeded_message(
        "seed-3-msg-1",
        Role::Assistant,
        "Hello! How can I assist you today?".into(),
        60,
    )];
    for turn in 0..7i64 {
        let user_index = 2 + turn * 2;
        support.push(seeded_message(
            &format!("seed-3-msg-{user_index}"),
            Role::User,
            "What's the best way to use this tool?".into(),
            59 - turn * 2,
        ));
        support.push(seeded_message(
            &format!("seed-3-msg-{}", user_index + 1),
            Role::Assistant,
            tips.into(),
            58 - turn * 2,
        ));
    }
    messages.insert("seed-3".to_string(), support);

    messages.insert(
        "seed-4".to_string(),
        vec![
            seeded_message(
                "seed-4-msg-1",
                Role::Assistant,
                "Hi! I'm ready to help. What do you need?".into(),
                90,
            ),
            seeded_message("seed-4-msg-2", Role::User, "Explain how to get started".into(), 89),
            seeded_message(
                "seed-4-msg-3",
                Role::Assistant,
                "Here's how to get started:\n\n**Getting Started Guide:**\n\n1. **Ask a Question**: Simply type what you need help with in the chat\n2. **Review Responses**: I'll provide detailed answers with explanations\n3. **Explore Features**: Try asking about different capabilities\n4. **Use Feedback**: Rate answers so they keep improving"
                    .into(),
                88,
            ),
        ],
    );

    (conversations, messages)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_sources_relevant_parts_located() {
        let sources = fixed_sources();
        assert_eq!(sources.len(), 4);

        // source-2 capitalizes "Make" differently from the text
        let located: Vec<usize> = sources.iter().map(|s| s.located_parts().len()).collect();
        assert_eq!(located, vec![3, 2, 3, 3]);
    }

    #[test]
    fn test_every_conversation_has_messages() {
        let (conversations, messages) = conversations();
        for conversation in &conversations {
            let list = messages.get(&conversation.id).unwrap();
            assert!(!list.is_empty());
            assert!(list.windows(2).all(|w| w[0].created_at <= w[1].created_at));
        }
        assert_eq!(messages["seed-3"].len(), 15);
    }
}
