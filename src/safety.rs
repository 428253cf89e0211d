/// Crisis-term screening for incoming messages. Flags never block a reply;
/// the chat service uses them to prepend crisis resources.
#[derive(Debug, Clone)]
pub struct SafetyPolicy {
    crisis_terms: Vec<String>,
}

impl Default for SafetyPolicy {
    fn default() -> Self {
        Self {
            crisis_terms: vec![
                "suicide".to_owned(),
                "kill myself".to_owned(),
                "self-harm".to_owned(),
                "hurt myself".to_owned(),
                "end my life".to_owned(),
            ],
        }
    }
}

impl SafetyPolicy {
    pub fn screen(&self, input: &str) -> Vec<String> {
        let lowercase = input.to_lowercase();
        self.crisis_terms
            .iter()
            .filter(|term| lowercase.contains(term.as_str()))
            .map(|term| format!("crisis-term:{term}"))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::SafetyPolicy;

    #[test]
    fn flags_crisis_terms_case_insensitively() {
        let policy = SafetyPolicy::default();
        let flags = policy.screen("I want to HURT MYSELF tonight");
        assert_eq!(flags, vec!["crisis-term:hurt myself".to_owned()]);
    }

    #[test]
    fn ordinary_messages_produce_no_flags() {
        let policy = SafetyPolicy::default();
        assert!(policy.screen("feeling a bit stressed about exams").is_empty());
    }
}
