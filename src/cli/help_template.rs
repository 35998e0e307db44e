use indoc::indoc;

// Help text template with placeholder
pub const HELP_TEMPLATE: &str = indoc! {r#"
    Examples:
      # Committing a value explicitly
      %BINARY_NAME% data.db set mykey "Hello, world!"

      # Committing a value from stdin
      echo "Hello, world!" | %BINARY_NAME% data.db set mykey
      cat file.txt | %BINARY_NAME% data.db set mykey

      # Reading a value
      %BINARY_NAME% data.db get mykey

      # Deleting a key
      %BINARY_NAME% data.db del mykey

      # Scanning a key range in order
      %BINARY_NAME% data.db scan --from user: --to user;

      # Displaying the version and counters
      %BINARY_NAME% data.db stats

      # Removing the collection and its side-car files
      %BINARY_NAME% data.db destroy
"#};
