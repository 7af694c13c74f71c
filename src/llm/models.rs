/// Default model tiers for the pipeline roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Model {
    /// Generation plus build/design fixes - strongest reasoning.
    Generate,
    /// Design review - a different model family for cognitive diversity.
    Review,
}

impl Model {
    pub fn id(&self) -> &'static str {
        match self {
            Model::Generate => "anthropic/claude-sonnet-4.5",
            Model::Review => "openai/gpt-oss-120b",
        }
    }

    pub fn max_tokens(&self) -> u32 {
        16384
    }
}
