use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
};

use log::{debug, trace};
use logos::Logos;
use thiserror::Error;

use crate::{ctx::ExtractionContext, span::Span, value::Value};

/// Tokenizer for `${..}` placeholders and `[[..]]` optional fragments.
mod lexer;

use lexer::QueryLex;

/// Query text ready to be handed to a loader, with the values bound to its
/// positional markers in order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PreparedQuery {
    pub text: String,
    pub values: Vec<Value>,
}

impl PreparedQuery {
    pub fn unchanged(text: &str) -> Self {
        Self {
            text: text.to_owned(),
            values: Vec::new(),
        }
    }
}

/// Turns a data set query and the visible parameters into a [PreparedQuery].
pub trait QueryPreprocessor: Send + Sync {
    fn preprocess(
        &self,
        query: &str,
        ctx: &ExtractionContext,
    ) -> Result<PreparedQuery, PreprocessError>;
}

/// Passes the query through and binds nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPreprocessor;

impl QueryPreprocessor for NoopPreprocessor {
    fn preprocess(&self, query: &str, _: &ExtractionContext) -> Result<PreparedQuery, PreprocessError> {
        Ok(PreparedQuery::unchanged(query))
    }
}

/// Replaces `${name}` placeholders with `?` markers and binds their values.
///
/// A name is looked up in the params first; a bare name (no dot) falls back to the
/// parent row. List values expand to one marker per item, for `IN (${ids})`.
///
/// Text between `[[` and `]]` is optional: it is dropped when any placeholder inside
/// it is unset, null, or an empty list. Outside optional fragments an unset
/// placeholder is an error.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqlPreprocessor;

/// Output being written, either straight to the query or to a pending optional fragment.
#[derive(Default)]
struct Fragment {
    text: String,
    values: Vec<Value>,
}

struct Optional {
    start: Span,
    fragment: Fragment,
    keep: bool,
}

impl QueryPreprocessor for SqlPreprocessor {
    fn preprocess(
        &self,
        query: &str,
        ctx: &ExtractionContext,
    ) -> Result<PreparedQuery, PreprocessError> {
        use PreprocessError as E;
        use QueryLex::*;

        let mut out = Fragment::default();
        let mut optional: Option<Optional> = None;
        let mut lexer = QueryLex::lexer(query);

        while let Some(token) = lexer.next() {
            let span = Span::from(lexer.span());
            let token = token.map_err(|_| E::UnterminatedLiteral(span))?;
            trace!("SQL token {token:?} at {span}");

            match token {
                OptionalStart => {
                    if optional.is_some() {
                        return Err(E::NestedOptional(span));
                    }
                    optional = Some(Optional {
                        start: span,
                        fragment: Fragment::default(),
                        keep: true,
                    });
                }
                OptionalEnd => {
                    let Some(done) = optional.take() else {
                        return Err(E::UnopenedOptional(span));
                    };
                    if done.keep {
                        out.text.push_str(&done.fragment.text);
                        out.values.extend(done.fragment.values);
                    } else {
                        debug!(
                            "Dropping optional fragment at {}",
                            done.start.combine(&span)
                        );
                    }
                }
                Placeholder(name) => {
                    let value = ctx.resolve(name);
                    match optional.as_mut() {
                        Some(opt) => match value {
                            Some(v) if !is_blank(v) => bind(&mut opt.fragment, v),
                            _ => opt.keep = false,
                        },
                        None => match value {
                            Some(Value::List(items)) if items.is_empty() => {
                                return Err(E::EmptyList {
                                    name: name.to_owned(),
                                    span,
                                })
                            }
                            Some(v) => bind(&mut out, v),
                            None => {
                                return Err(E::UnresolvedParameter {
                                    name: name.to_owned(),
                                    span,
                                })
                            }
                        },
                    }
                }
                Literal | Text | Punct => {
                    let target = match optional.as_mut() {
                        Some(opt) => &mut opt.fragment,
                        None => &mut out,
                    };
                    target.text.push_str(lexer.slice());
                }
            }
        }

        if let Some(opt) = optional {
            return Err(E::UnclosedOptional(opt.start));
        }

        Ok(PreparedQuery {
            text: out.text,
            values: out.values,
        })
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::List(items) => items.is_empty(),
        _ => false,
    }
}

fn bind(fragment: &mut Fragment, value: &Value) {
    match value {
        Value::List(items) => {
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    fragment.text.push_str(", ");
                }
                fragment.text.push('?');
                fragment.values.push(item.clone());
            }
        }
        other => {
            fragment.text.push('?');
            fragment.values.push(other.clone());
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PreprocessError {
    #[error("Parameter `{name}` at {span} is not set")]
    UnresolvedParameter { name: String, span: Span },

    #[error("Parameter `{name}` at {span} is an empty list")]
    EmptyList { name: String, span: Span },

    #[error("Optional fragment opened at {0} is not closed")]
    UnclosedOptional(Span),

    #[error("Optional fragment closed at {0} was never opened")]
    UnopenedOptional(Span),

    #[error("Optional fragments cannot be nested, found one at {0}")]
    NestedOptional(Span),

    #[error("Unterminated string literal at {0}")]
    UnterminatedLiteral(Span),
}

/// Preprocessors keyed by loader type. Types without an entry get the default,
/// which is a [NoopPreprocessor] unless replaced.
pub struct PreprocessorFactory {
    preprocessors: RwLock<HashMap<String, Arc<dyn QueryPreprocessor>>>,
    default: Arc<dyn QueryPreprocessor>,
}

impl PreprocessorFactory {
    /// Factory with no registrations, everything goes to the no-op default.
    pub fn empty() -> Self {
        Self {
            preprocessors: RwLock::new(HashMap::new()),
            default: Arc::new(NoopPreprocessor),
        }
    }

    pub fn with_default(mut self, default: Arc<dyn QueryPreprocessor>) -> Self {
        self.default = default;
        self
    }

    /// Register a preprocessor, replacing any previous one for the same loader type.
    pub fn register(&self, loader_type: impl Into<String>, preprocessor: Arc<dyn QueryPreprocessor>) {
        let loader_type = loader_type.into();
        debug!("Registering query preprocessor for `{loader_type}`");
        self.preprocessors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(loader_type, preprocessor);
    }

    pub fn preprocessor_by(&self, loader_type: &str) -> Arc<dyn QueryPreprocessor> {
        self.preprocessors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(loader_type)
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.default))
    }
}

impl Default for PreprocessorFactory {
    /// `sql` gets the [SqlPreprocessor], all other types the no-op.
    fn default() -> Self {
        let factory = Self::empty();
        factory.register(crate::loader::SQL_LOADER, Arc::new(SqlPreprocessor));
        factory
    }
}

impl std::fmt::Debug for PreprocessorFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registry = self.preprocessors.read().unwrap_or_else(PoisonError::into_inner);
        let mut keys: Vec<_> = registry.keys().collect();
        keys.sort();
        f.debug_struct("PreprocessorFactory")
            .field("registered", &keys)
            .finish_non_exhaustive()
    }
}
