//! Lexical layer: quote tracking, tokenization, and structural command
//! parsing.

pub mod command_parser;
pub mod quote_info;
pub mod tokenizer;
pub mod types;

pub use command_parser::{parse_pipeline, Command, RedirOp, Redirection};
pub use quote_info::{quote_state_at, QuoteScanner, QuoteState};
pub use tokenizer::tokenize;
pub use types::{strip_quotes, ParseException, Token, TokenQuoting};
