use steward_core::{ComponentKind, CoreVersionInfo, ReleaseNote, UpdateEntry, UpdateSnapshot};

pub fn render_notes(
    releases: &[ReleaseNote],
    display_name: &str,
    kind: ComponentKind,
) -> String {
    let mut rendered = String::new();
    for release in releases {
        let build_suffix = match (kind, release.build.as_deref()) {
            (ComponentKind::Core, Some(build)) if !build.is_empty() => format!(".{build}"),
            _ => String::new(),
        };
        rendered.push_str(&format!(
            "<h5>{display_name} {}{build_suffix}</h5>",
            release.version
        ));
        rendered.push_str(&format!("<ul><li>{}</li></ul>", release.notes));
    }
    rendered
}

pub fn core_version_label(core: &CoreVersionInfo) -> String {
    if core.latest_build.is_empty() {
        core.latest_version.clone()
    } else {
        format!("{} Build {}", core.latest_version, core.latest_build)
    }
}

pub fn build_update_entries(snapshot: &UpdateSnapshot, core_name: &str) -> Vec<UpdateEntry> {
    let mut entries = Vec::new();

    let core = &snapshot.core;
    if core.update_available() && !core.releases.is_empty() {
        entries.push(UpdateEntry {
            kind: ComponentKind::Core,
            name: core_name.to_string(),
            handle: core_name.to_string(),
            version: core_version_label(core),
            latest_version: core.latest_version.clone(),
            latest_build: Some(core.latest_build.clone()).filter(|build| !build.is_empty()),
            critical: core.critical_update_available,
            manual_update_required: Some(core.manual_update_required),
            notes: render_notes(&core.releases, core_name, ComponentKind::Core),
        });
    }

    for extension in snapshot.extensions.values() {
        if !extension.update_available() || extension.releases.is_empty() {
            continue;
        }
        entries.push(UpdateEntry {
            kind: ComponentKind::Extension,
            name: extension.display_name.clone(),
            handle: extension.id.clone(),
            version: extension.latest_version.clone(),
            latest_version: extension.latest_version.clone(),
            latest_build: None,
            critical: extension.critical_update_available(),
            manual_update_required: None,
            notes: render_notes(
                &extension.releases,
                &extension.display_name,
                ComponentKind::Extension,
            ),
        });
    }

    entries
}
