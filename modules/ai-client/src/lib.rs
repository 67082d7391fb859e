pub mod error;
pub mod openai;
pub mod provider;
pub mod traits;
pub mod util;

pub use error::{AiError, Result};
pub use openai::OpenAi;
pub use provider::Provider;
pub use traits::{Message, MessageRole, TextCompletion};
pub use util::truncate_to_char_boundary;
