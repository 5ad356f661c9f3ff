// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Text output.

use sas_topology::ExpanderReport;
use sas_topology::LabelStyle;
use sas_topology::Topology;

/// One line of `sasmap list`.
#[derive(Debug, Clone)]
pub struct DeviceRow {
    pub name: String,
    pub type_name: &'static str,
    pub block: String,
    pub wwid: String,
}

pub fn device_list(rows: &[DeviceRow]) -> String {
    rows.iter()
        .map(|row| {
            format!(
                "{:<12} {:<18} {:<6} {}",
                row.name, row.type_name, row.block, row.wwid
            )
            .trim_end()
            .to_owned()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// The mapped slots grouped by expander, with the phy wired to each.
pub fn slot_table(topology: &Topology, style: LabelStyle) -> String {
    let per_expander = topology.layout.slots_per_expander;
    let mut lines = Vec::new();
    for (index, expander) in topology.expanders.iter() {
        let slots: Vec<_> = topology
            .slots
            .iter()
            .skip(index * per_expander)
            .take(per_expander)
            .filter(|(_, slot)| !slot.is_vacant() || slot.last_discovery.is_some())
            .collect();
        if expander.world_wide_id64 == 0 && slots.is_empty() {
            continue;
        }

        let mut header = format!("Expander {index}: {:016x}", expander.world_wide_id64);
        if !expander.device_name.is_empty() {
            header.push_str(&format!(" [{}]", expander.device_name));
        }
        if !expander.enclosure_id.is_empty() {
            header.push_str(&format!(" enclosure {}", expander.enclosure_id));
        }
        if let Some(path) = &expander.bound_transport_path {
            header.push_str(&format!(" via {}", path.display()));
        }
        lines.push(header);

        for (slot_index, slot) in slots {
            let phy = slot
                .phy_id()
                .map_or_else(|| "-".to_owned(), |phy| phy.to_string());
            lines.push(format!("  {:<24} phy {phy}", slot.label(style, slot_index)));
        }
    }
    lines.push(format!(
        "occupied {}/{}, expanders {}",
        topology.slots.count(),
        topology.slots.len(),
        topology.expanders.count()
    ));
    lines.join("\n")
}

/// The phy summaries of each walked expander.
pub fn expander_reports(reports: &[ExpanderReport]) -> String {
    let mut lines = Vec::new();
    for report in reports {
        let mut header = report.path.display().to_string();
        if let Some(target) = report.target {
            header.push_str(&format!(" -> {target:016x}"));
        }
        lines.push(header);
        lines.extend(report.lines.iter().cloned());
    }
    lines.join("\n")
}
