use pcode_test::test::{Parser, Test};

#[test]
fn parse_flags() {
    let src = " +a\t+b  -abc-foo -foo  +bar+foo";
    let mut flags = pcode_test::test::parse_flags(src);
    assert_eq!(flags.next(), Some(("a", true)));
    assert_eq!(flags.next(), Some(("b", true)));
    assert_eq!(flags.next(), Some(("abc-foo", false)));
    assert_eq!(flags.next(), Some(("foo", false)));
    assert_eq!(flags.next(), Some(("bar+foo", true)));
    assert_eq!(flags.next(), None);
}

#[test]
fn parse() -> Result<(), String> {
    let src = r#"# comment
        1000: 00 00     NOP # comment
        1002: 10 01     ADD r0, r1 # +flag
                        | r0 = r0 + r1
                        |   Z = r0 == 0x0

              ab cd  DEAD beef
        ...
        2000: 05     INC r5
    "#;

    let mut parser = Parser::new("input", src);
    let mut test = Test::default();

    assert!(parser.parse(&mut test)?);
    assert_eq!(test.line, 2);
    assert_eq!(test.address, 0x1000);
    assert_eq!(test.bytes, &[0x00, 0x00]);
    assert_eq!(test.asm, "NOP");
    assert_eq!(test.comment, "comment");
    assert!(test.pcode.is_empty());

    assert!(parser.parse(&mut test)?);
    assert_eq!(test.line, 3);
    assert_eq!(test.address, 0x1002);
    assert_eq!(test.bytes, &[0x10, 0x01]);
    assert_eq!(test.asm, "ADD r0, r1");
    assert_eq!(test.comment, "+flag");
    assert_eq!(test.pcode, ["r0 = r0 + r1", "Z = r0 == 0x0"]);

    assert!(parser.parse(&mut test)?);
    assert_eq!(test.line, 7);
    assert_eq!(test.address, 0);
    assert_eq!(test.bytes, &[0xab, 0xcd]);
    assert_eq!(test.asm, "DEAD beef");

    assert!(parser.parse(&mut test)?);
    assert_eq!(test.address, 0x2000);
    assert_eq!(test.bytes, &[0x05]);
    assert_eq!(test.asm, "INC r5");

    assert!(!parser.parse(&mut test)?);
    Ok(())
}

#[test]
fn orphan_pcode() {
    let mut parser = Parser::new("input", "| r0 = r1\n");
    let mut test = Test::default();
    let err = parser.parse(&mut test).unwrap_err();
    assert!(err.contains("input:1"), "{err}");
}

#[test]
fn parse_all() -> Result<(), String> {
    let src = "
        1000: 01 02     A
        1004: 03        B
    ";
    let (start, data) = Parser::parse_all(src)?;
    assert_eq!(start, 0x1000);
    assert_eq!(data, [1, 2, 0, 0, 3]);
    Ok(())
}
