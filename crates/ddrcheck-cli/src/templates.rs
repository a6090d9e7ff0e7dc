pub const DEMO_CUSTOMERS: &str = r#"ID;NAME;BALANCE
1;Ada Lovelace;1200.50
2;Alan Turing;-35.00
3;Grace Hopper;0
"#;

pub const DEMO_ORDERS: &str = r#"ORDER_ID;CUSTOMER_ID;CREATED
1001;1;2024-01-05
1002;3;2024-01-06
"#;

pub const DDR_YAML: &str = r#"# Column layout of the data dictionary sheets (workbook or one CSV per sheet).
# delimiter only applies to CSV exports.
first_line: 1
field_column: 0
format_column: 1
pk_column: 2
delimiter: ";"
sheets: ["*"]
# First matching pattern wins. \1, \2 refer to capture groups.
formats:
  - pattern: 'VARCHAR2?\((\d+)\)'
    type: VARCHAR
    size: '\1'
  - pattern: 'CHAR\((\d+)\)'
    type: VARCHAR
    size: '\1'
  - pattern: 'NUMBER\((\d+),\s*(\d+)\)'
    type: DECIMAL
    size: '\1'
    precision: '\2'
  - pattern: 'NUMBER\((\d+)\)'
    type: INTEGER
    size: '\1'
  - pattern: 'DATE'
    type: DATE
    size: '10'
"#;
