use serde::Deserialize;

#[derive(Deserialize, Debug)]
pub struct ChatCompletionResp {
    pub model: Option<String>,
    pub choices: Vec<ChatChoice>,
}

#[derive(Deserialize, Debug)]
pub struct ChatChoice {
    pub message: ChatMessage,
}

#[derive(Deserialize, Debug)]
pub struct ChatMessage {
    pub content: Option<String>,
}
