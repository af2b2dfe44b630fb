use crate::{ExtensionVersionInfo, ReleaseNote};

pub fn any_critical(releases: &[ReleaseNote]) -> bool {
    releases.iter().any(|release| release.critical)
}

pub fn any_manual_required(releases: &[ReleaseNote]) -> bool {
    releases.iter().any(|release| release.manual_update_required)
}

pub fn any_critical_across_extensions<'a, I>(extensions: I) -> bool
where
    I: IntoIterator<Item = &'a ExtensionVersionInfo>,
{
    extensions.into_iter().any(|extension| {
        extension.update_available()
            && !extension.releases.is_empty()
            && any_critical(&extension.releases)
    })
}
