//! Static scan for embedded lambdas the lambda compiler rejects.

use teval_core::expr::Function;
use teval_ops::CompiledLambda;

/// Human-readable issue list; empty when every lambda compiles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Issues {
    pub list: Vec<String>,
}

impl Issues {
    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.list.iter().map(String::as_str)
    }
}

/// Walk the outer tree of `function` (before any optimization) and report
/// each map/join/merge node whose lambda does not compile.
pub fn detect_issues(function: &Function) -> Issues {
    let mut issues = Issues::default();
    function.root().walk(&mut |node| {
        if let Some(lambda) = node.lambda() {
            if !CompiledLambda::detect_issues(lambda).is_empty() {
                issues.list.push(format!(
                    "lambda function that cannot be compiled within {}",
                    node.kind_name()
                ));
            }
        }
    });
    #[cfg(feature = "tracing")]
    {
        if !issues.is_empty() {
            tracing::debug!(count = issues.len(), "lambda issues detected");
        }
    }
    issues
}
