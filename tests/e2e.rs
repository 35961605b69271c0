use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::io::Write;
use std::process::Command;
use tempfile::tempdir;

// md5("password")
const PASSWORD_MD5: &str = "5f4dcc3b5aa765d61d8327deb882cf99";

fn hashaudit() -> Command {
    let mut cmd = Command::cargo_bin("hashaudit").unwrap();
    cmd.arg("--color").arg("never");
    cmd
}

#[test]
fn e2e_dictionary_recovers_password() {
    let tmp = tempdir().unwrap();
    let wordlist = tmp.path().join("words.txt");
    {
        let mut f = fs::File::create(&wordlist).unwrap();
        writeln!(f, "letmein").unwrap();
        writeln!(f, "Password").unwrap();
        writeln!(f, "qwerty").unwrap();
    }

    // "password" is only reachable through the lowercase rule.
    hashaudit()
        .arg("--hash")
        .arg(PASSWORD_MD5.to_uppercase())
        .arg("-w")
        .arg(&wordlist)
        .arg("--workers")
        .arg("2")
        .arg("--authorized")
        .assert()
        .success()
        .stdout(predicate::str::contains("Password Recovered"))
        .stdout(predicate::str::contains("password"));
}

#[test]
fn e2e_exhausted_search_exits_one() {
    let tmp = tempdir().unwrap();
    let wordlist = tmp.path().join("words.txt");
    fs::write(&wordlist, "alpha\nbeta\n").unwrap();

    hashaudit()
        .arg("--hash")
        .arg(PASSWORD_MD5)
        .arg("-w")
        .arg(&wordlist)
        .arg("--no-rules")
        .arg("--authorized")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Password Not Recovered"))
        .stdout(predicate::str::contains("search space exhausted"));
}

#[test]
fn e2e_brute_force_with_custom_charset() {
    // md5("ab1")
    let digest = "68b6a776378decbb4a79cda89087c4ce";
    hashaudit()
        .arg("--hash")
        .arg(digest)
        .arg("--attack")
        .arg("brute-force")
        .arg("--custom-charset")
        .arg("c:ab")
        .arg("-m")
        .arg("?c?c?d")
        .arg("--authorized")
        .assert()
        .success()
        .stdout(predicate::str::contains("ab1"));
}

#[test]
fn e2e_refuses_without_authorization() {
    let tmp = tempdir().unwrap();
    let wordlist = tmp.path().join("words.txt");
    fs::write(&wordlist, "password\n").unwrap();

    hashaudit()
        .arg("--hash")
        .arg(PASSWORD_MD5)
        .arg("-w")
        .arg(&wordlist)
        .assert()
        .code(2)
        .stdout(predicate::str::contains("Password Recovered").not());
}

#[test]
fn e2e_missing_wordlist_is_invalid_input() {
    hashaudit()
        .arg("--hash")
        .arg(PASSWORD_MD5)
        .arg("-w")
        .arg("/definitely/not/here.txt")
        .arg("--authorized")
        .assert()
        .code(2);
}

#[test]
fn e2e_malformed_digest_is_invalid_input() {
    hashaudit()
        .arg("--hash")
        .arg("not-a-digest")
        .arg("--attack")
        .arg("brute-force")
        .arg("-m")
        .arg("?d")
        .arg("--authorized")
        .assert()
        .code(2);
}

#[test]
fn e2e_estimate_prints_mask_size() {
    hashaudit()
        .arg("--estimate")
        .arg("-m")
        .arg("?l?l?l?l")
        .assert()
        .success()
        .stdout(predicate::str::contains("456976"));

    hashaudit()
        .arg("--estimate")
        .arg("-m")
        .arg("?l?x")
        .assert()
        .code(2)
        .stdout(predicate::str::contains("error:"));
}

#[test]
fn e2e_extra_rule_and_named_algorithm() {
    let tmp = tempdir().unwrap();
    let wordlist = tmp.path().join("words.txt");
    fs::write(&wordlist, "drowssap\n").unwrap();
    // sha256("password"), reachable only by reversing the word.
    let digest = "5e884898da28047151d0e56f8dc6292773603d0d6aabbdd62a11ef721d1542d8";

    hashaudit()
        .arg("--hash")
        .arg(digest)
        .arg("-a")
        .arg("SHA256")
        .arg("-w")
        .arg(&wordlist)
        .arg("--no-rules")
        .arg("--rule")
        .arg("reverse_word")
        .arg("--authorized")
        .assert()
        .success()
        .stdout(predicate::str::contains("reverse_word"))
        .stdout(predicate::str::contains("SHA-256"));

    hashaudit()
        .arg("--hash")
        .arg(digest)
        .arg("-a")
        .arg("bcrypt")
        .arg("-w")
        .arg(&wordlist)
        .arg("--authorized")
        .assert()
        .failure();
}

#[test]
fn e2e_listings() {
    hashaudit()
        .arg("--list-placeholders")
        .assert()
        .success()
        .stdout(predicate::str::contains("?H"))
        .stdout(predicate::str::contains("digits (0-9)"));

    hashaudit()
        .arg("--list-rules")
        .assert()
        .success()
        .stdout(predicate::str::contains("remove_consonants"));
}

#[test]
fn e2e_suggest_masks_from_known_passwords() {
    let tmp = tempdir().unwrap();
    let known = tmp.path().join("cracked.txt");
    fs::write(&known, "summer24\nwinter19\nautumn88\n").unwrap();

    hashaudit()
        .arg("--suggest-masks")
        .arg(&known)
        .assert()
        .success()
        .stdout(predicate::str::contains("Suggested Masks"))
        .stdout(predicate::str::contains("?l?l?l?l?l?l?d?d"))
        .stdout(predicate::str::contains("3 known"));
}
