//! Ledger field definitions
//!
//! Each field is identified on the wire by `(type code, field code)`;
//! canonical serialization sorts by that pair.

/// Serialized type of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TypeCode {
    UInt16 = 1,
    UInt32 = 2,
    UInt64 = 3,
    Hash128 = 4,
    Hash256 = 5,
    Amount = 6,
    Blob = 7,
    AccountId = 8,
    StObject = 14,
    StArray = 15,
    UInt8 = 16,
    Hash160 = 17,
    PathSet = 18,
    Vector256 = 19,
}

impl TypeCode {
    pub fn from_code(code: u8) -> Option<Self> {
        use TypeCode::*;
        Some(match code {
            1 => UInt16,
            2 => UInt32,
            3 => UInt64,
            4 => Hash128,
            5 => Hash256,
            6 => Amount,
            7 => Blob,
            8 => AccountId,
            14 => StObject,
            15 => StArray,
            16 => UInt8,
            17 => Hash160,
            18 => PathSet,
            19 => Vector256,
            _ => return None,
        })
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    /// Fixed width of hash types
    pub fn hash_len(self) -> Option<usize> {
        match self {
            TypeCode::Hash128 => Some(16),
            TypeCode::Hash160 => Some(20),
            TypeCode::Hash256 => Some(32),
            _ => None,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct FieldDef {
    pub name: &'static str,
    pub type_code: TypeCode,
    pub nth: u8,
}

impl FieldDef {
    /// Position in canonical order
    pub fn ordinal(&self) -> (u8, u8) {
        (self.type_code.code(), self.nth)
    }

    /// Fields that never enter the signing serialization
    pub fn is_signing_field(&self) -> bool {
        !matches!(self.name, "TxnSignature" | "Signers")
    }
}

pub fn by_name(name: &str) -> Option<&'static FieldDef> {
    FIELDS.iter().find(|def| def.name == name)
}

pub fn by_code(type_code: TypeCode, nth: u8) -> Option<&'static FieldDef> {
    FIELDS.iter().find(|def| def.type_code == type_code && def.nth == nth)
}

macro_rules! fields {
    ($( $type_code:ident { $( $name:ident = $nth:expr ),* $(,)? } )*) => {
        static FIELDS: &[FieldDef] = &[
            $( $( FieldDef { name: stringify!($name), type_code: TypeCode::$type_code, nth: $nth }, )* )*
        ];
    };
}

fields! {
    UInt16 {
        LedgerEntryType = 1, TransactionType = 2, SignerWeight = 3, TransferFee = 4,
    }
    UInt32 {
        NetworkID = 1, Flags = 2, SourceTag = 3, Sequence = 4, PreviousTxnLgrSeq = 5,
        LedgerSequence = 6, CloseTime = 7, ParentCloseTime = 8, SigningTime = 9,
        Expiration = 10, TransferRate = 11, WalletSize = 12, OwnerCount = 13,
        DestinationTag = 14, HighQualityIn = 16, HighQualityOut = 17, LowQualityIn = 18,
        LowQualityOut = 19, QualityIn = 20, QualityOut = 21, StampEscrow = 22,
        BondAmount = 23, LoadFee = 24, OfferSequence = 25, FirstLedgerSequence = 26,
        LastLedgerSequence = 27, TransactionIndex = 28, OperationLimit = 29,
        ReferenceFeeUnits = 30, ReserveBase = 31, ReserveIncrement = 32, SetFlag = 33,
        ClearFlag = 34, SignerQuorum = 35, CancelAfter = 36, FinishAfter = 37,
        SignerListID = 38, SettleDelay = 39, TicketCount = 40, TicketSequence = 41,
    }
    UInt64 {
        IndexNext = 1, IndexPrevious = 2, BookNode = 3, OwnerNode = 4, BaseFee = 5,
        ExchangeRate = 6, LowNode = 7, HighNode = 8, DestinationNode = 9,
    }
    Hash128 {
        EmailHash = 1,
    }
    Hash256 {
        LedgerHash = 1, ParentHash = 2, TransactionHash = 3, AccountHash = 4,
        PreviousTxnID = 5, LedgerIndex = 6, WalletLocator = 7, RootIndex = 8,
        AccountTxnID = 9, BookDirectory = 16, InvoiceID = 17, Nickname = 18,
        Amendment = 19, Digest = 21, Channel = 22, CheckID = 24,
    }
    Amount {
        Amount = 1, Balance = 2, LimitAmount = 3, TakerPays = 4, TakerGets = 5,
        LowLimit = 6, HighLimit = 7, Fee = 8, SendMax = 9, DeliverMin = 10,
        DeliveredAmount = 18,
    }
    Blob {
        PublicKey = 1, MessageKey = 2, SigningPubKey = 3, TxnSignature = 4, Signature = 6,
        Domain = 7, FundCode = 8, RemoveCode = 9, ExpireCode = 10, CreateCode = 11,
        MemoType = 12, MemoData = 13, MemoFormat = 14, Fulfillment = 16, Condition = 17,
    }
    AccountId {
        Account = 1, Owner = 2, Destination = 3, Issuer = 4, Authorize = 5,
        Unauthorize = 6, RegularKey = 8,
    }
    StObject {
        ObjectEndMarker = 1, TransactionMetaData = 2, CreatedNode = 3, DeletedNode = 4,
        ModifiedNode = 5, PreviousFields = 6, FinalFields = 7, NewFields = 8,
        TemplateEntry = 9, Memo = 10, SignerEntry = 11, Signer = 16, Majority = 18,
    }
    StArray {
        ArrayEndMarker = 1, Signers = 3, SignerEntries = 4, Template = 5, Necessary = 6,
        Sufficient = 7, AffectedNodes = 8, Memos = 9, Majorities = 16,
    }
    UInt8 {
        CloseResolution = 1, Method = 2, TransactionResult = 3, TickSize = 16,
    }
    Hash160 {
        TakerPaysCurrency = 1, TakerPaysIssuer = 2, TakerGetsCurrency = 3, TakerGetsIssuer = 4,
    }
    PathSet {
        Paths = 1,
    }
    Vector256 {
        Indexes = 1, Hashes = 2, Amendments = 3,
    }
}
