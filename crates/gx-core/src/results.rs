//! Running one operation across many instances and collecting the outcomes

use std::future::Future;
use std::sync::Arc;

use futures::future::join_all;

use crate::component::ComponentKind;
use crate::error::{GeneosError, Result};
use crate::instance::Instance;

/// The outcome of an operation on one instance
#[derive(Debug)]
pub struct Response {
    pub host: String,
    pub kind: ComponentKind,
    pub name: String,
    /// A short description on success
    pub result: Result<String>,
}

impl Response {
    pub fn new(instance: &Instance, result: Result<String>) -> Self {
        Self {
            host: instance.host().name().to_string(),
            kind: instance.kind(),
            name: instance.name().to_string(),
            result,
        }
    }

    /// `type:name@host`
    pub fn id(&self) -> String {
        format!("{}:{}@{}", self.kind, self.name, self.host)
    }

    fn sort_key(&self) -> (&str, ComponentKind, &str) {
        (&self.host, self.kind, &self.name)
    }
}

/// Counts of each kind of outcome
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub ok: usize,
    /// Soft failures such as an unsupported operation
    pub skipped: usize,
    pub failed: usize,
}

/// Responses sorted by host, type and name
#[derive(Debug, Default)]
pub struct Responses(Vec<Response>);

impl Responses {
    pub fn new(mut responses: Vec<Response>) -> Self {
        responses.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        Self(responses)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Response> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn summary(&self) -> Summary {
        let mut summary = Summary::default();
        for response in &self.0 {
            match &response.result {
                Ok(_) => summary.ok += 1,
                Err(e) if e.is_soft() => summary.skipped += 1,
                Err(_) => summary.failed += 1,
            }
        }
        summary
    }

    /// True when nothing failed hard
    pub fn is_success(&self) -> bool {
        self.summary().failed == 0
    }

    /// The first hard failure, if any
    pub fn first_error(&self) -> Option<(&Response, &GeneosError)> {
        self.0.iter().find_map(|r| match &r.result {
            Err(e) if !e.is_soft() => Some((r, e)),
            _ => None,
        })
    }
}

impl IntoIterator for Responses {
    type Item = Response;
    type IntoIter = std::vec::IntoIter<Response>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Responses {
    type Item = &'a Response;
    type IntoIter = std::slice::Iter<'a, Response>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Run `op` on every instance concurrently and gather the results
pub async fn for_each<F, Fut>(instances: &[Arc<Instance>], op: F) -> Responses
where
    F: Fn(Arc<Instance>) -> Fut,
    Fut: Future<Output = Result<String>>,
{
    let futures = instances.iter().map(|instance| {
        let fut = op(Arc::clone(instance));
        async move { Response::new(instance, fut.await) }
    });
    Responses::new(join_all(futures).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GlobalConfig, HostsFile};
    use crate::Context;

    #[tokio::test]
    async fn test_for_each_sorts_and_counts() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = GlobalConfig {
            root: dir.path().to_path_buf(),
            ..GlobalConfig::default()
        };
        let ctx = Context::new(config, HostsFile::default());
        let instances = vec![
            ctx.instance(ComponentKind::Netprobe, "b", "localhost").unwrap(),
            ctx.instance(ComponentKind::Gateway, "z", "localhost").unwrap(),
            ctx.instance(ComponentKind::Netprobe, "a", "localhost").unwrap(),
        ];

        let responses = for_each(&instances, |instance| async move {
            match instance.name() {
                "a" => Ok("done".to_string()),
                "b" => Err(GeneosError::NotSupported("reload".to_string())),
                _ => Err(GeneosError::Process("boom".to_string())),
            }
        })
        .await;

        let ids: Vec<String> = responses.iter().map(Response::id).collect();
        assert_eq!(
            ids,
            vec!["gateway:z@localhost", "netprobe:a@localhost", "netprobe:b@localhost"]
        );
        assert_eq!(
            responses.summary(),
            Summary {
                ok: 1,
                skipped: 1,
                failed: 1
            }
        );
        assert!(!responses.is_success());
        assert_eq!(responses.first_error().unwrap().0.name, "z");
    }
}
