//! Usenet article construction (RFC 5536)
//!
//! - `types`: subject template, headers and the encoded article
//! - `builder`: ArticleBuilder plus Message-ID helpers

mod builder;
mod types;

pub use self::builder::{
    ArticleBuilder, DEFAULT_MESSAGE_ID_DOMAIN, USER_AGENT, generate_message_id, message_id_domain,
};
pub use self::types::{ArticleHeaders, EncodedArticle, SubjectTemplate};
