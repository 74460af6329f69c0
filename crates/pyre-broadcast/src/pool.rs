//! Ordered, cyclic pool of remote endpoints.

use tracing::debug;

use crate::ConfigurationError;

/// Result of a [`EndpointPool::rotate`] request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rotation<'a> {
    /// The endpoint now current (unchanged when `rotated` is false).
    pub endpoint: &'a str,
    /// Whether the cursor actually moved.
    pub rotated: bool,
}

/// A fixed, non-empty list of endpoints with a round-robin cursor.
///
/// The endpoint list never changes after construction. The cursor only moves
/// through [`rotate`](Self::rotate), and it outlives any single broadcast so
/// a node that failed on one run is skipped on the next.
#[derive(Debug, Clone)]
pub struct EndpointPool {
    endpoints: Vec<String>,
    index: usize,
}

impl EndpointPool {
    /// Create a pool starting at the first endpoint.
    pub fn new<I, S>(endpoints: I) -> Result<Self, ConfigurationError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let endpoints: Vec<String> = endpoints.into_iter().map(Into::into).collect();
        if endpoints.is_empty() {
            return Err(ConfigurationError::EmptyEndpoints);
        }

        Ok(Self {
            endpoints,
            index: 0,
        })
    }

    /// The endpoint at the cursor.
    pub fn current(&self) -> &str {
        &self.endpoints[self.index]
    }

    /// Advance the cursor to the next endpoint, wrapping at the end.
    ///
    /// A single-endpoint pool has no alternate, so this is a no-op that
    /// reports `rotated: false`.
    pub fn rotate(&mut self) -> Rotation<'_> {
        if self.endpoints.len() <= 1 {
            return Rotation {
                endpoint: self.current(),
                rotated: false,
            };
        }

        let from = self.index;
        self.index = (self.index + 1) % self.endpoints.len();
        debug!(
            from = %self.endpoints[from],
            to = %self.endpoints[self.index],
            "rotated endpoint"
        );

        Rotation {
            endpoint: self.current(),
            rotated: true,
        }
    }

    /// Current cursor position.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    /// Always false; kept for clippy's `len_without_is_empty`.
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }
}
