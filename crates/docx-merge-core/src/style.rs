//! Cell formatting copier.
//!
//! Copies a small, fixed set of properties from a template cell onto a
//! generated cell: vertical alignment, the first paragraph's alignment and
//! style, and the first run's bold/italic/underline/font/size/color. Only the
//! first paragraph and run of either cell are looked at.

use crate::xml::{XmlElement, XmlNode};

/// Child order of `w:tcPr` (CT_TcPr).
const TC_PR_ORDER: &[&str] = &[
    "cnfStyle", "tcW", "gridSpan", "hMerge", "vMerge", "tcBorders", "shd", "noWrap", "tcMar",
    "textDirection", "tcFitText", "vAlign", "hideMark",
];

/// Child order of `w:pPr` (CT_PPr).
const P_PR_ORDER: &[&str] = &[
    "pStyle", "keepNext", "keepLines", "pageBreakBefore", "framePr", "widowControl", "numPr",
    "suppressLineNumbers", "pBdr", "shd", "tabs", "suppressAutoHyphens", "kinsoku", "wordWrap",
    "overflowPunct", "topLinePunct", "autoSpaceDE", "autoSpaceDN", "bidi", "adjustRightInd",
    "snapToGrid", "spacing", "ind", "contextualSpacing", "mirrorIndents", "suppressOverlap", "jc",
    "textDirection", "textAlignment", "textboxTightWrap", "outlineLvl", "divId", "cnfStyle",
    "rPr", "sectPr", "pPrChange",
];

/// Child order of `w:rPr` (CT_RPr).
const R_PR_ORDER: &[&str] = &[
    "rStyle", "rFonts", "b", "bCs", "i", "iCs", "caps", "smallCaps", "strike", "dstrike",
    "outline", "shadow", "emboss", "imprint", "noProof", "snapToGrid", "vanish", "webHidden",
    "color", "spacing", "w", "kern", "position", "sz", "szCs", "highlight", "u", "effect",
    "bdr", "shd", "fitText", "vertAlign", "rtl", "cs", "em", "lang", "eastAsianLayout",
    "specVanish", "oMath",
];

const RUN_PROPERTIES: &[&str] = &["b", "i", "u", "rFonts", "sz", "color"];

/// Copy the supported subset of `source` cell formatting onto `target`.
/// Properties absent from the source are left alone on the target.
pub fn copy_cell_style(source: &XmlElement, target: &mut XmlElement) {
    if let Some(v_align) = source.w_child("tcPr").and_then(|pr| pr.w_child("vAlign")) {
        let tc_pr = ensure_property_block(target, "tcPr");
        set_ordered_child(tc_pr, v_align.clone(), TC_PR_ORDER);
    }

    let Some(src_p) = source.w_child("p") else {
        return;
    };
    let Some(dst_p) = target.w_child_mut("p") else {
        return;
    };

    if let Some(src_ppr) = src_p.w_child("pPr") {
        for name in ["jc", "pStyle"] {
            if let Some(prop) = src_ppr.w_child(name) {
                let p_pr = ensure_property_block(dst_p, "pPr");
                set_ordered_child(p_pr, prop.clone(), P_PR_ORDER);
            }
        }
    }

    let Some(src_rpr) = src_p.w_child("r").and_then(|r| r.w_child("rPr")) else {
        return;
    };
    let Some(dst_r) = dst_p.w_child_mut("r") else {
        return;
    };
    for name in RUN_PROPERTIES {
        if let Some(prop) = src_rpr.w_child(name) {
            let r_pr = ensure_property_block(dst_r, "rPr");
            set_ordered_child(r_pr, prop.clone(), R_PR_ORDER);
        }
    }
}

/// Set paragraph alignment (`w:jc`) on every paragraph of a cell.
pub fn set_cell_alignment(cell: &mut XmlElement, alignment: &str) {
    for p in cell.elements_mut().filter(|el| el.is_w("p")) {
        let mut jc = p.new_w("jc");
        jc.set_w_attr("val", alignment);
        let p_pr = ensure_property_block(p, "pPr");
        set_ordered_child(p_pr, jc, P_PR_ORDER);
    }
}

/// Return the `w:<name>` property block of `parent`, creating it as the first
/// element child when missing. Property blocks always lead their parent.
pub(crate) fn ensure_property_block<'a>(
    parent: &'a mut XmlElement,
    name: &str,
) -> &'a mut XmlElement {
    let idx = match parent
        .children
        .iter()
        .position(|n| n.as_element().is_some_and(|el| el.is_w(name)))
    {
        Some(idx) => idx,
        None => {
            let block = parent.new_w(name);
            let at = parent
                .children
                .iter()
                .position(|n| matches!(n, XmlNode::Element(_)))
                .unwrap_or(parent.children.len());
            parent.children.insert(at, XmlNode::Element(block));
            at
        }
    };
    match &mut parent.children[idx] {
        XmlNode::Element(el) => el,
        _ => unreachable!("index points at an element"),
    }
}

/// Insert `child` into `parent` at its schema position, replacing any
/// existing element of the same name.
pub(crate) fn set_ordered_child(parent: &mut XmlElement, child: XmlElement, order: &[&str]) {
    if let Some(existing) = parent.elements_mut().find(|el| el.is_w(&child.name)) {
        *existing = child;
        return;
    }
    let rank = |name: &str| order.iter().position(|n| *n == name).unwrap_or(order.len());
    let child_rank = rank(&child.name);
    let at = parent
        .children
        .iter()
        .position(|n| n.as_element().is_some_and(|el| rank(&el.name) > child_rank))
        .unwrap_or(parent.children.len());
    parent.children.insert(at, XmlNode::Element(child));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::tests::body;

    fn first_cell(inner: &str) -> XmlElement {
        let b = body(&format!("<w:tbl><w:tr><w:tc>{}</w:tc></w:tr></w:tbl>", inner));
        b.w_child("tbl")
            .and_then(|t| t.w_child("tr"))
            .and_then(|r| r.w_child("tc"))
            .unwrap()
            .clone()
    }

    fn names(el: &XmlElement) -> Vec<String> {
        el.elements().map(|e| e.name.clone()).collect()
    }

    #[test]
    fn test_copies_supported_properties() {
        let source = first_cell(
            r#"<w:tcPr><w:tcW w:w="2000"/><w:vAlign w:val="center"/></w:tcPr>
            <w:p><w:pPr><w:pStyle w:val="TableText"/><w:jc w:val="right"/></w:pPr>
            <w:r><w:rPr><w:rFonts w:ascii="Arial"/><w:b/><w:i/><w:color w:val="FF0000"/><w:sz w:val="28"/><w:u w:val="single"/></w:rPr><w:t>{{K}}</w:t></w:r></w:p>"#,
        );
        let mut target = first_cell(r#"<w:p><w:r><w:t>v</w:t></w:r></w:p>"#);

        copy_cell_style(&source, &mut target);

        let tc_pr = target.w_child("tcPr").unwrap();
        assert_eq!(tc_pr.w_child("vAlign").unwrap().w_attr("val"), Some("center"));
        // tcW is outside the copied subset
        assert!(tc_pr.w_child("tcW").is_none());

        let p = target.w_child("p").unwrap();
        assert_eq!(names(p.w_child("pPr").unwrap()), vec!["pStyle", "jc"]);

        let r_pr = p.w_child("r").unwrap().w_child("rPr").unwrap();
        assert_eq!(names(r_pr), vec!["rFonts", "b", "i", "color", "sz", "u"]);
        assert_eq!(r_pr.w_child("rFonts").unwrap().w_attr("ascii"), Some("Arial"));
        // rPr leads the run
        assert_eq!(names(p.w_child("r").unwrap()), vec!["rPr", "t"]);
    }

    #[test]
    fn test_absent_properties_are_skipped() {
        let source = first_cell(r#"<w:p><w:r><w:t>plain</w:t></w:r></w:p>"#);
        let mut target = first_cell(r#"<w:p><w:r><w:rPr><w:b/></w:rPr><w:t>v</w:t></w:r></w:p>"#);
        let before = target.clone();

        copy_cell_style(&source, &mut target);
        assert_eq!(target, before);
    }

    #[test]
    fn test_existing_property_is_replaced() {
        let source = first_cell(r#"<w:p><w:r><w:rPr><w:sz w:val="40"/></w:rPr><w:t>x</w:t></w:r></w:p>"#);
        let mut target =
            first_cell(r#"<w:p><w:r><w:rPr><w:sz w:val="20"/></w:rPr><w:t>v</w:t></w:r></w:p>"#);

        copy_cell_style(&source, &mut target);

        let r_pr = target.w_child("p").unwrap().w_child("r").unwrap().w_child("rPr").unwrap();
        assert_eq!(r_pr.w_children("sz").count(), 1);
        assert_eq!(r_pr.w_child("sz").unwrap().w_attr("val"), Some("40"));
    }

    #[test]
    fn test_set_cell_alignment() {
        let mut cell = first_cell(r#"<w:p><w:pPr><w:pStyle w:val="X"/></w:pPr><w:r><w:t>1</w:t></w:r></w:p>"#);
        set_cell_alignment(&mut cell, "center");
        let p_pr = cell.w_child("p").unwrap().w_child("pPr").unwrap();
        assert_eq!(names(p_pr), vec!["pStyle", "jc"]);
        assert_eq!(p_pr.w_child("jc").unwrap().w_attr("val"), Some("center"));
    }
}
