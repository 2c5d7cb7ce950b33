use super::pattern::normalize;
use super::Route;
use crate::request::Params;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Default)]
/// The registered routes, keyed by method and normalized pattern.
///
/// Routes are kept in registration order.  Registering a key that already
/// exists replaces the endpoint in place, keeping the original position in
/// the order.
pub(crate) struct RouteTable {
    routes: Vec<Arc<Route>>,
    index: HashMap<(http::Method, String), usize>,
}

impl RouteTable {
    /// Inserts the route, returning whether it replaced an earlier one.
    pub(crate) fn insert(&mut self, route: Route) -> bool {
        let key = (route.method().clone(), route.path().to_owned());
        let route = Arc::new(route);

        if let Some(&position) = self.index.get(&key) {
            log::debug!("route: {} {} replaces an earlier registration", key.0, key.1);
            self.routes[position] = route;
            true
        } else {
            log::trace!("route: {} {}", key.0, key.1);
            self.index.insert(key, self.routes.len());
            self.routes.push(route);
            false
        }
    }

    /// Finds the route for the given method and (still encoded) request
    /// path.
    ///
    /// A static route registered under exactly this path is found directly.
    /// Otherwise, every route with a matching method is tried in
    /// registration order, and the first to match wins.
    pub(crate) fn lookup(
        &self,
        method: &http::Method,
        path: &str,
    ) -> Option<(Arc<Route>, Params)> {
        let key = (method.clone(), normalize(path));
        let exact = self
            .index
            .get(&key)
            .map(|&position| &self.routes[position])
            .filter(|route| route.pattern.is_static());
        if let Some(route) = exact {
            return Some((route.clone(), Params::default()));
        }

        self.routes
            .iter()
            .filter(|route| route.method() == method)
            .find_map(|route| route.pattern.matches(path).map(|params| (route.clone(), params)))
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Arc<Route>> {
        self.routes.iter()
    }

    pub(crate) fn len(&self) -> usize {
        self.routes.len()
    }
}
