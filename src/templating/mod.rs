//! Template rendering for `render` file mappings.
//!
//! Package templates use `<% %>` tags:
//!
//! | Tag               | Meaning                                  |
//! |-------------------|------------------------------------------|
//! | `<%= expr %>`     | output `expr` as text, HTML-escaped      |
//! | `<%- expr %>`     | output `expr` unescaped                  |
//! | `<% stmt %>`      | control flow (`if`, `for`, `set`, ...)   |
//! | `<%# comment %>`  | dropped                                  |
//! | `<%%`             | a literal `<%`                           |
//!
//! Tags are translated to Tera syntax and rendered with the build configuration
//! as context; everything outside tags is emitted verbatim, including text that
//! looks like Tera's own `{{ }}` delimiters. Statements and expressions inside
//! tags are Tera expressions: `<% if debug %>..<% endif %>`,
//! `<%= items | length %>`.
//!
//! Escaped output replaces `& < > " '` only; `/` is kept as is.

pub mod filters;
pub mod renderer;
pub mod syntax;

pub use renderer::TemplateRenderer;
