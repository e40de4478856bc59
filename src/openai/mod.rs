mod core;

pub use self::core::{CompletionProvider, FragmentStream, Message, OpenAiProvider, Role};
