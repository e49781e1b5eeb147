//! Instruction preamble composed in front of every question

/// Fixed instructions sent ahead of the caller's context and question.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    /// Who the model speaks as, e.g. "a helpful assistant for a Quran memorization academy"
    pub assistant_role: String,
    /// Language every answer must be written in
    pub response_language: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            assistant_role: "a helpful assistant for a Quran memorization academy".to_string(),
            response_language: "Arabic".to_string(),
        }
    }
}

impl PromptTemplate {
    /// Build the single request payload: preamble, then context, then question.
    pub fn compose(&self, context: &str, prompt: &str) -> String {
        format!(
            "You are {role}.\n\
             \n\
             Academy information:\n\
             {context}\n\
             \n\
             Important instructions:\n\
             - Answer in {language} only\n\
             - Be helpful and polite\n\
             - Stick to the academy information above\n\
             - If you do not know the answer, direct the user to contact the academy directly\n\
             - Use emoji where appropriate\n\
             \n\
             User question: {prompt}\n\
             \n\
             Answer:\n",
            role = self.assistant_role,
            language = self.response_language,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compose_orders_preamble_context_prompt() {
        let template = PromptTemplate::default();
        let composed = template.compose("Fees: 20 USD/month", "How much is it?");

        let role_at = composed.find("You are a helpful assistant").unwrap();
        let context_at = composed.find("Fees: 20 USD/month").unwrap();
        let language_at = composed.find("Answer in Arabic only").unwrap();
        let prompt_at = composed.find("User question: How much is it?").unwrap();

        assert!(role_at < context_at);
        assert!(context_at < language_at);
        assert!(language_at < prompt_at);
    }

    #[test]
    fn compose_includes_contact_redirection() {
        let composed = PromptTemplate::default().compose("", "q");
        assert!(composed.contains("contact the academy directly"));
    }

    #[test]
    fn compose_uses_configured_language_and_role() {
        let template = PromptTemplate {
            assistant_role: "the front desk bot".into(),
            response_language: "English".into(),
        };
        let composed = template.compose("ctx", "q");
        assert!(composed.starts_with("You are the front desk bot."));
        assert!(composed.contains("Answer in English only"));
    }
}
