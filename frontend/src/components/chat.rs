use leptos::ev;
use leptos::prelude::*;

use crate::models::{Language, Role};
use crate::reassembler::ChatMachine;
use crate::state::AppState;

/// Main chat area with the conversation, the typing indicator and input.
#[component]
pub fn ChatArea() -> impl IntoView {
    let state = expect_context::<AppState>();

    view! {
        <main class="chat-area">
            // Error banner
            {move || {
                state.chat.with(|m| m.last_error().map(str::to_string)).map(|err| {
                    view! {
                        <div class="error-banner">{err}</div>
                    }
                })
            }}

            <ChatHeader />

            // Messages
            <div class="messages-container">
                {move || {
                    let snapshot = state.chat.with(ChatMachine::snapshot);
                    if snapshot.turns.is_empty() {
                        view! {
                            <div class="empty-state">
                                "Send a message to start chatting"
                            </div>
                        }.into_any()
                    } else {
                        view! {
                            {snapshot
                                .turns
                                .into_iter()
                                .filter(|t| !(t.role == Role::Assistant && t.content.is_empty()))
                                .map(|t| view! { <MessageBubble role=t.role content=t.content /> })
                                .collect_view()}
                            // Assistant is expected to answer, nothing arrived yet
                            {snapshot.composing.then(|| view! {
                                <div class="message assistant">
                                    <div class="role-label">"assistant"</div>
                                    <div class="typing-indicator">"…"</div>
                                </div>
                            })}
                        }.into_any()
                    }
                }}
            </div>

            // Input area
            <ChatInput />
        </main>
    }
}

/// Conversation label, language picker and "New chat".
#[component]
fn ChatHeader() -> impl IntoView {
    let state = expect_context::<AppState>();

    view! {
        <div class="chat-header">
            <span class="chat-title">
                {move || {
                    match state.chat.with(|m| m.conversation_id().map(str::to_string)) {
                        Some(id) => format!("Conversation: {}", short_id(&id)),
                        None => "New conversation".to_string(),
                    }
                }}
            </span>
            <select
                class="language-select"
                prop:value=move || state.language.get().label()
                on:change=move |ev| {
                    state.language.set(Language::from_label(&event_target_value(&ev)));
                }
            >
                {Language::ALL
                    .into_iter()
                    .map(|l| view! { <option value=l.label()>{l.label()}</option> })
                    .collect_view()}
            </select>
            <button class="new-chat-btn" on:click=move |_| state.start_new_chat()>
                "+ New Chat"
            </button>
        </div>
    }
}

/// First eight characters of a conversation id, for display.
fn short_id(id: &str) -> String {
    id.chars().take(8).collect()
}

/// A single chat message bubble.
#[component]
fn MessageBubble(role: Role, content: String) -> impl IntoView {
    let css_class = match role {
        Role::User => "message user",
        Role::Assistant => "message assistant",
    };

    view! {
        <div class=css_class>
            <div class="role-label">{role.as_str()}</div>
            <div>{content}</div>
        </div>
    }
}

/// Chat input form with textarea and send button.
#[component]
fn ChatInput() -> impl IntoView {
    let state = expect_context::<AppState>();
    let (input, set_input) = signal(String::new());

    let is_sending = move || state.chat.with(ChatMachine::in_flight);

    let send = move || {
        let text = input.get().trim().to_string();
        if text.is_empty() || is_sending() {
            return;
        }
        set_input.set(String::new());
        state.send_message(text);
    };

    let on_keydown = move |ev: ev::KeyboardEvent| {
        if ev.key() == "Enter" && !ev.shift_key() {
            ev.prevent_default();
            send();
        }
    };

    view! {
        <div class="input-area">
            <div class="input-row">
                <textarea
                    rows="1"
                    placeholder="Type a message… (Enter to send, Shift+Enter for newline)"
                    prop:value=input
                    on:input=move |ev| {
                        set_input.set(event_target_value(&ev));
                    }
                    on:keydown=on_keydown
                    disabled=is_sending
                />
                <button
                    class="send-btn"
                    on:click=move |_| send()
                    disabled=move || is_sending() || input.get().trim().is_empty()
                >
                    {move || if is_sending() { "Sending…" } else { "Send" }}
                </button>
            </div>
        </div>
    }
}
