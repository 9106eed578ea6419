use serde::Serialize;

use crate::plugins::registry::EndpointTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RouteKind {
    /// Direct-mode call answered in the same request.
    Execute,
    /// Queued-mode call answered with a job handle.
    Submit,
    /// Companion status route of a queued endpoint.
    Status,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, utoipa::ToSchema)]
pub struct RouteEntry {
    pub method: String,
    pub path: String,
    pub endpoint: String,
    pub kind: RouteKind,
}

/// REST routes implied by one revision of the endpoint table. The router
/// itself serves these through two parametric routes resolved per request,
/// so a reload changes the routes without rebuilding the router.
#[derive(Debug, Clone, Default, Serialize, utoipa::ToSchema)]
pub struct RouteTable {
    pub revision: u64,
    pub routes: Vec<RouteEntry>,
}

impl RouteTable {
    pub fn from_table(table: &EndpointTable) -> Self {
        let mut routes = Vec::with_capacity(table.len() * 2);
        for d in table.iter() {
            let base = format!("/api/{}", d.path);
            if d.queue_mode {
                routes.push(RouteEntry {
                    method: "POST".into(),
                    path: base.clone(),
                    endpoint: d.path.clone(),
                    kind: RouteKind::Submit,
                });
                routes.push(RouteEntry {
                    method: "POST".into(),
                    path: format!("{}/queue", base),
                    endpoint: d.path.clone(),
                    kind: RouteKind::Status,
                });
            } else {
                routes.push(RouteEntry {
                    method: "POST".into(),
                    path: base,
                    endpoint: d.path.clone(),
                    kind: RouteKind::Execute,
                });
            }
        }
        Self {
            revision: table.revision,
            routes,
        }
    }

    pub fn find(&self, path: &str) -> Option<&RouteEntry> {
        self.routes.iter().find(|r| r.path == path)
    }
}
