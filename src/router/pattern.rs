use crate::request::Params;
use percent_encoding::percent_decode_str;
use std::borrow::Cow;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(Arc<str>),
}

#[derive(Clone, Debug)]
/// A route pattern, decomposed into its segments.
///
/// A pattern is a path such as `/users/:id/posts/:postId`.  Segments that
/// begin with a `:` bind the matching request segment under that name; every
/// other segment has to match exactly.  Empty segments are dropped, so
/// leading, trailing, and repeated slashes never matter.
pub(crate) struct Pattern {
    normalized: String,
    segments: Arc<[Segment]>,
}

impl Pattern {
    pub(crate) fn new(source: &str) -> Self {
        let segments = split(source)
            .map(|segment| match segment.strip_prefix(':') {
                Some(name) => Segment::Param(Arc::from(name)),
                None => Segment::Literal(segment.to_owned()),
            })
            .collect::<Arc<[_]>>();

        Pattern {
            normalized: normalize(source),
            segments,
        }
    }

    /// The pattern with its empty segments removed; e.g. `/users/:id/` is
    /// normalized to `/users/:id`.  This is the key the route table uses.
    pub(crate) fn normalized(&self) -> &str {
        &self.normalized
    }

    /// Whether the pattern contains no parameters.
    pub(crate) fn is_static(&self) -> bool {
        self.segments
            .iter()
            .all(|segment| matches!(segment, Segment::Literal(_)))
    }

    /// Matches the (still encoded) request path against this pattern.
    pub(crate) fn matches(&self, path: &str) -> Option<Params> {
        let mut params = Params::default();
        let mut request = split(path);

        for segment in self.segments.iter() {
            let value = request.next()?;
            match segment {
                Segment::Param(name) => params.insert(name.clone(), decode(value).into_owned()),
                Segment::Literal(literal) if literal == value => {}
                Segment::Literal(_) => return None,
            }
        }

        match request.next() {
            Some(_) => None,
            None => Some(params),
        }
    }
}

/// Matches a request path against a route pattern, returning the bound
/// parameters on success.
///
/// Both are split on `/`, ignoring empty segments, and have to have the
/// same number of segments.  A `:name` segment in the pattern binds the
/// percent-decoded request segment as `name`; any other segment has to be
/// byte-equal to the request segment, as it was sent.
///
/// # Examples
/// ```rust
/// let params = noheadache::match_path("/users/:id", "/users/a%2Fb").unwrap();
/// assert_eq!(params.get("id"), Some("a/b"));
/// assert!(noheadache::match_path("/a/:b", "/a").is_none());
/// ```
pub fn match_path(pattern: &str, path: &str) -> Option<Params> {
    Pattern::new(pattern).matches(path)
}

fn split(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|segment| !segment.is_empty())
}

fn decode(segment: &str) -> Cow<'_, str> {
    percent_decode_str(segment).decode_utf8_lossy()
}

pub(crate) fn normalize(path: &str) -> String {
    let mut buffer = String::with_capacity(path.len() + 1);
    for segment in split(path) {
        buffer.push('/');
        buffer.push_str(segment);
    }
    if buffer.is_empty() {
        buffer.push('/');
    }
    buffer
}
