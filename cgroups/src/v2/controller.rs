use std::path::Path;

use crate::config::Resources;

pub(super) trait Controller {
    type Error;

    fn apply(resources: &Resources, cgroup_path: &Path) -> Result<(), Self::Error>;
}
