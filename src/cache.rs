/// Told when a persisted query completes, so cached query lists for the
/// space can be refetched.
pub trait CacheInvalidator: Send + Sync {
    fn invalidate_queries(&self, space_id: Option<&str>);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopInvalidator;

impl CacheInvalidator for NoopInvalidator {
    fn invalidate_queries(&self, _space_id: Option<&str>) {}
}

impl<F> CacheInvalidator for F
where
    F: Fn(Option<&str>) + Send + Sync,
{
    fn invalidate_queries(&self, space_id: Option<&str>) {
        self(space_id)
    }
}
