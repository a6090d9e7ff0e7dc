use ddrcheck_core::scope::ScopeStore;
use ddrcheck_core::storage::{ExtractorFile, PagedQuery};
use std::fs;
use tempfile::{tempdir, TempDir};

fn fixture(rows: usize) -> (TempDir, ExtractorFile) {
    let dir = tempdir().unwrap();
    let scopes = dir.path().join("scopes");
    fs::create_dir_all(scopes.join("S/V/ITEMS")).unwrap();
    fs::write(scopes.join("S/metadata.yaml"), "Separator: ','\nExtension: csv\n").unwrap();
    fs::write(
        scopes.join("S/V/ITEMS/structure.yaml"),
        "- {name: CODE, type: VARCHAR, size: 5}\n",
    )
    .unwrap();

    let input = dir.path().join("in");
    fs::create_dir_all(&input).unwrap();
    let mut body = String::from("code\n");
    for i in 0..rows {
        body.push_str(&format!("c{}\n", i));
    }
    fs::write(input.join("ITEMS.csv"), body).unwrap();

    let store = ScopeStore::new(scopes);
    let file = ExtractorFile::new(&store, "S", "V", "ITEMS", input);
    (dir, file)
}

#[test]
fn pages_through_default_query() -> anyhow::Result<()> {
    let (_dir, file) = fixture(25);
    let mut q = PagedQuery::new(10);

    let p0 = q.fetch(&file, 0)?;
    assert_eq!(p0.total_rows, 25);
    assert_eq!(p0.total_pages, 3);
    assert_eq!(p0.rows.len(), 10);
    assert_eq!(p0.columns, vec!["LINE_NUMBER", "CODE"]);

    let p2 = q.fetch(&file, 2)?;
    assert_eq!(p2.page, 2);
    assert_eq!(p2.rows.len(), 5);
    assert_eq!(p2.rows[0], vec!["21", "c20"]);
    Ok(())
}

#[test]
fn out_of_range_page_is_clamped_to_the_last() -> anyhow::Result<()> {
    let (_dir, file) = fixture(25);
    let mut q = PagedQuery::new(10);
    let p = q.fetch(&file, 7)?;
    assert_eq!(p.page, 2);
    assert_eq!(p.rows.len(), 5);
    Ok(())
}

#[test]
fn empty_result_reports_one_page() -> anyhow::Result<()> {
    let (_dir, file) = fixture(3);
    let mut q = PagedQuery::new(10);
    q.set_query(Some("SELECT * FROM data WHERE CODE = 'zzz';".into()));
    let p = q.fetch(&file, 4)?;
    assert_eq!(p.total_rows, 0);
    assert_eq!(p.total_pages, 1);
    assert_eq!(p.page, 0);
    assert!(p.rows.is_empty());
    Ok(())
}

#[test]
fn explicit_limit_runs_verbatim() -> anyhow::Result<()> {
    let (_dir, file) = fixture(25);
    let mut q = PagedQuery::new(10);
    q.set_query(Some("select CODE from data order by LINE_NUMBER desc limit 3".into()));
    let p = q.fetch(&file, 1)?;
    assert_eq!(p.rows, vec![vec!["c24"], vec!["c23"], vec!["c22"]]);
    assert_eq!(p.total_rows, 3);
    Ok(())
}

#[test]
fn regexp_is_available_to_queries() -> anyhow::Result<()> {
    let (_dir, file) = fixture(12);
    let mut q = PagedQuery::new(100);
    q.set_query(Some("SELECT CODE FROM data WHERE CODE REGEXP '^c1[0-9]$'".into()));
    let p = q.fetch(&file, 0)?;
    assert_eq!(p.rows, vec![vec!["c10"], vec!["c11"]]);
    Ok(())
}

#[test]
fn writes_and_multiple_statements_are_rejected() {
    let (_dir, file) = fixture(2);
    let mut q = PagedQuery::new(10);

    q.set_query(Some("DELETE FROM data".into()));
    assert!(q.fetch(&file, 0).is_err());

    q.set_query(Some("SELECT 1; SELECT 2".into()));
    assert!(q.fetch(&file, 0).is_err());

    q.set_query(None);
    assert_eq!(q.fetch(&file, 0).unwrap().total_rows, 2);
}

#[test]
fn stale_count_steps_back_to_a_page_with_rows() -> anyhow::Result<()> {
    let (dir, file) = fixture(25);
    let mut q = PagedQuery::new(10);
    assert_eq!(q.fetch(&file, 0)?.total_pages, 3);

    // Rebuild the cache from a shorter source; the count for this query is
    // still the memoized 25.
    file.invalidate()?;
    fs::write(dir.path().join("in/ITEMS.csv"), "code\nx1\nx2\nx3\n")?;
    file.ensure_cached()?;

    let p = q.fetch(&file, 2)?;
    assert_eq!(p.page, 0);
    assert_eq!(p.total_rows, 25);
    assert_eq!(p.rows.len(), 3);
    assert_eq!(p.rows[0], vec!["1", "x1"]);
    Ok(())
}

#[test]
fn trailing_line_comment_does_not_swallow_paging() -> anyhow::Result<()> {
    let (_dir, file) = fixture(25);
    let mut q = PagedQuery::new(10);
    q.set_query(Some("SELECT CODE FROM data WHERE CODE LIKE 'c1%' -- tens".into()));
    let p = q.fetch(&file, 0)?;
    assert_eq!(p.total_rows, 11);
    assert_eq!(p.total_pages, 2);
    assert_eq!(p.rows.len(), 10);
    Ok(())
}
