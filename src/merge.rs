use crate::errors::AseError;
use crate::types::{MappingTable, MergedSite, MergedTable, SiteKey};
use anyhow::Result;
use log::info;
use std::collections::HashMap;

/// Index a table's rows by site, refusing duplicate keys.
///
/// An inner join over duplicated keys would fan rows out and silently
/// double the depths fed into averaging, so duplicates are fatal.
fn index_sites(table: &MappingTable, name: &str) -> Result<HashMap<SiteKey, usize>> {
    let mut index = HashMap::with_capacity(table.rows.len());
    for (i, row) in table.rows.iter().enumerate() {
        if let Some(prev) = index.insert(row.site.clone(), i) {
            return Err(AseError::DuplicateSite {
                table: name.to_string(),
                chrom: row.site.chrom.clone(),
                pos: row.site.pos,
                first_row: prev + 1,
                second_row: i + 1,
            }
            .into());
        }
    }
    Ok(index)
}

/// Suffix every annotation header with its mapping code so both survive the join.
fn suffixed_headers(table: &MappingTable) -> impl Iterator<Item = String> + '_ {
    table
        .annotation_headers
        .iter()
        .map(move |h| format!("{}_{}", h, table.code))
}

/// Inner-join the two mapping tables on (CHROM, POS).
///
/// Sites called against only one pseudogenome cannot be reconciled and are
/// dropped. Row order follows the first table.
pub fn merge_tables(first: MappingTable, second: MappingTable) -> Result<MergedTable> {
    let first_name = format!("mapping {}", first.code);
    let second_name = format!("mapping {}", second.code);
    index_sites(&first, &first_name)?;
    let lookup = index_sites(&second, &second_name)?;

    let annotation_headers: Vec<String> = suffixed_headers(&first)
        .chain(suffixed_headers(&second))
        .collect();

    let first_total = first.rows.len();
    let second_total = second.rows.len();

    let mut second_rows: Vec<Option<_>> = second.rows.into_iter().map(Some).collect();

    let mut sites = Vec::new();
    for row in first.rows {
        let Some(&idx) = lookup.get(&row.site) else {
            continue;
        };
        let Some(other) = second_rows[idx].take() else {
            continue;
        };
        let mut annotations = row.annotations;
        annotations.extend(other.annotations);
        sites.push(MergedSite {
            site: row.site,
            annotations,
            first: row.calls,
            second: other.calls,
        });
    }

    info!(
        "Merged {} sites ({} only in {}, {} only in {})",
        sites.len(),
        first_total - sites.len(),
        first_name,
        second_total - sites.len(),
        second_name
    );

    Ok(MergedTable {
        annotation_headers,
        sites,
    })
}
