//! Per-namespace identifier normalization heuristics
//!
//! Providers annotate the same record with ids in slightly different
//! shapes: isoform suffixes, accession versions, namespace-prefixed
//! numeric ids. Normalizing before lookup or grouping makes exact-match
//! comparison effective. Lookups stay case-sensitive — case differences
//! are meaningful in this domain (ZHX1-C8orf76 vs ZHX1-C8ORF76).

/// Normalize a raw identifier according to its namespace's conventions.
///
/// - isoform-style namespaces (UniProt and friends): strip the isoform
///   suffix after the last `-` (`P04150-2` → `P04150`)
/// - versioned accession namespaces (RefSeq): strip the version after the
///   last `.` (`NP_012345.2` → `NP_012345`)
/// - colon-delimited numeric namespaces (KEGG): keep the numeric tail
///   after the last `:` (`hsa:12345` → `12345`)
/// - PubChem substance/compound ids gain their `SID:`/`CID:` prefix
/// - ChEBI bare numeric ids gain the `CHEBI:` prefix
///
/// Unknown namespaces pass the identifier through unchanged.
pub fn normalize(namespace: &str, raw: &str) -> String {
    let ns = namespace.to_ascii_uppercase();
    let id = raw.trim();

    if ns.contains("UNIPROT") || ns.contains("SWISSPROT") || ns.contains("TREMBL") {
        strip_numeric_suffix(id, '-')
    } else if ns.contains("REFSEQ") {
        strip_numeric_suffix(id, '.')
    } else if ns.starts_with("KEGG") {
        numeric_tail(id)
    } else if ns.contains("PUBCHEM") && (ns.contains("SUBSTANCE") || ns.contains("SID")) {
        prefix_numeric(&id.to_ascii_uppercase(), "SID:")
    } else if ns.contains("PUBCHEM") && (ns.contains("COMPOUND") || ns.contains("CID")) {
        prefix_numeric(&id.to_ascii_uppercase(), "CID:")
    } else if ns == "CHEBI" {
        prefix_numeric(id, "CHEBI:")
    } else {
        id.to_string()
    }
}

/// Normalize a mapping-table source namespace to its canonical name
/// (provider synonyms like "SwissProt" or "uniprot knowledgebase" all
/// denote the UNIPROT accession space).
pub fn normalize_namespace(namespace: &str) -> String {
    let ns = namespace.trim().to_ascii_uppercase();
    if ns.starts_with("UNIPROT") || ns.starts_with("SWISSPROT") || ns.contains("TREMBL") {
        "UNIPROT".to_string()
    } else if ns.starts_with("PUBCHEM") && (ns.contains("COMPOUND") || ns.contains("CID")) {
        "PUBCHEM-COMPOUND".to_string()
    } else if ns.starts_with("PUBCHEM") && (ns.contains("SUBSTANCE") || ns.contains("SID")) {
        "PUBCHEM-SUBSTANCE".to_string()
    } else {
        ns
    }
}

/// Guess-normalize an identifier when no source namespace hint is given.
/// Conservative: only transforms shapes that are unambiguous for the
/// requested destination space.
pub fn normalize_for_destination(dst_space: &str, raw: &str) -> String {
    let dst = dst_space.to_ascii_uppercase();
    let id = raw.trim();
    if dst == "UNIPROT" {
        if id.contains('-') && is_isoform_shape(id) {
            return strip_numeric_suffix(id, '-');
        }
        if id.contains('.') {
            // versioned RefSeq accession mapped into the protein space
            return strip_numeric_suffix(id, '.');
        }
        id.to_string()
    } else if dst == "CHEBI" {
        prefix_numeric(id, "CHEBI:")
    } else {
        id.to_string()
    }
}

/// True when the id looks like a UniProt isoform (accession + "-" + digits)
fn is_isoform_shape(id: &str) -> bool {
    match id.rsplit_once('-') {
        Some((head, tail)) => {
            !head.is_empty() && !tail.is_empty() && tail.chars().all(|c| c.is_ascii_digit())
        }
        None => false,
    }
}

/// Strip a trailing `<sep><digits>` segment, if present
fn strip_numeric_suffix(id: &str, sep: char) -> String {
    match id.rsplit_once(sep) {
        Some((head, tail))
            if !head.is_empty() && !tail.is_empty() && tail.chars().all(|c| c.is_ascii_digit()) =>
        {
            head.to_string()
        }
        _ => id.to_string(),
    }
}

/// Extract the numeric tail after the last `:`, when there is one
fn numeric_tail(id: &str) -> String {
    match id.rsplit_once(':') {
        Some((_, tail)) if !tail.is_empty() && tail.chars().all(|c| c.is_ascii_digit()) => {
            tail.to_string()
        }
        _ => id.to_string(),
    }
}

/// Prefix bare numeric ids with the namespace tag
fn prefix_numeric(id: &str, prefix: &str) -> String {
    if !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()) {
        format!("{}{}", prefix, id)
    } else {
        id.to_string()
    }
}
